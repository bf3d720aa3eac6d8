//! 展示用的格式化函数

const KB: i64 = 1024;
const MB: i64 = 1024 * KB;
const GB: i64 = 1024 * MB;

const HOUR: i64 = 3600;
const DAY: i64 = 24 * HOUR;
const WEEK: i64 = 7 * DAY;

/// 字节数转为可读大小，最多保留两位小数，如 `1.5 KB`
pub fn format_bytes(bytes: i64) -> String {
    let (value, unit) = if bytes >= GB {
        (bytes as f64 / GB as f64, "GB")
    } else if bytes >= MB {
        (bytes as f64 / MB as f64, "MB")
    } else if bytes >= KB {
        (bytes as f64 / KB as f64, "KB")
    } else {
        return format!("{bytes} B");
    };
    format!("{} {}", trim_decimals(value), unit)
}

fn trim_decimals(value: f64) -> String {
    let text = format!("{value:.2}");
    text.trim_end_matches('0').trim_end_matches('.').to_string()
}

/// 调度间隔描述，如 `every 6h`；不大于 0 时为 `never`
pub fn format_interval(seconds: i64) -> String {
    let rounded = |unit: i64| (seconds as f64 / unit as f64).round() as i64;
    if seconds <= 0 {
        "never".to_string()
    } else if seconds < HOUR {
        format!("every {} min", rounded(60))
    } else if seconds < DAY {
        format!("every {}h", rounded(HOUR))
    } else if seconds < WEEK {
        format!("every {}d", rounded(DAY))
    } else {
        format!("every {}w", rounded(WEEK))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(0), "0 B");
        assert_eq!(format_bytes(1023), "1023 B");
        assert_eq!(format_bytes(1024), "1 KB");
        assert_eq!(format_bytes(1536), "1.5 KB");
        assert_eq!(format_bytes(5 * MB + MB / 3), "5.33 MB");
        assert_eq!(format_bytes(3 * GB), "3 GB");
    }

    #[test]
    fn test_format_interval() {
        assert_eq!(format_interval(0), "never");
        assert_eq!(format_interval(-5), "never");
        assert_eq!(format_interval(60), "every 1 min");
        assert_eq!(format_interval(90), "every 2 min");
        assert_eq!(format_interval(3600), "every 1h");
        assert_eq!(format_interval(86_400), "every 1d");
        assert_eq!(format_interval(604_800), "every 1w");
        assert_eq!(format_interval(1_209_600), "every 2w");
    }
}
