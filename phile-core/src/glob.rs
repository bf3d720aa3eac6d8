//! 文件匹配模式
//!
//! 支持 shell 风格的 `*`、`?`、`[...]`（`[!...]` 取反），可以包含子目录
//! （如 `daily/*.tar.gz`），每一段在对应深度上匹配一个路径组件。
//! 与 shell 一致，通配符不匹配以 `.` 开头的名字，除非该段本身以 `.` 开头。

use crate::{PhileError, Result};
use regex::{Regex, RegexBuilder};
use std::path::{Path, PathBuf};
use tracing::debug;
use walkdir::WalkDir;

#[derive(Debug, Clone)]
struct Segment {
    regex: Regex,
    matches_hidden: bool,
}

impl Segment {
    fn matches(&self, name: &str) -> bool {
        if name.starts_with('.') && !self.matches_hidden {
            return false;
        }
        self.regex.is_match(name)
    }
}

/// 编译后的文件匹配模式
#[derive(Debug, Clone)]
pub struct FilePattern {
    raw: String,
    segments: Vec<Segment>,
}

impl FilePattern {
    pub fn parse(pattern: &str) -> Result<Self> {
        let parts: Vec<&str> = pattern
            .split(['/', '\\'])
            .filter(|part| !part.is_empty() && *part != ".")
            .collect();

        if parts.contains(&"..") {
            return Err(PhileError::invalid_record(format!(
                "文件匹配模式不能引用上级目录: {pattern}"
            )));
        }

        let parts = if parts.is_empty() { vec!["*"] } else { parts };
        let segments = parts
            .into_iter()
            .map(compile_segment)
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            raw: pattern.to_string(),
            segments,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// 模式包含的路径层数
    pub fn depth(&self) -> usize {
        self.segments.len()
    }

    /// 判断相对于输出目录的路径是否匹配
    pub fn matches(&self, relative: &Path) -> bool {
        let names: Vec<String> = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect();
        names.len() == self.segments.len()
            && names
                .iter()
                .zip(&self.segments)
                .all(|(name, segment)| segment.matches(name))
    }

    /// 在目录下查找匹配的普通文件，结果按路径排序
    ///
    /// 不可读的条目直接跳过。
    pub fn find_files(&self, root: &Path) -> Vec<PathBuf> {
        let depth = self.depth();
        let mut found: Vec<PathBuf> = WalkDir::new(root)
            .min_depth(depth)
            .max_depth(depth)
            .follow_links(true)
            .into_iter()
            .filter_map(|entry| match entry {
                Ok(entry) => Some(entry),
                Err(e) => {
                    debug!("跳过无法访问的路径: {}", e);
                    None
                }
            })
            .filter(|entry| entry.file_type().is_file())
            .filter(|entry| {
                entry
                    .path()
                    .strip_prefix(root)
                    .is_ok_and(|relative| self.matches(relative))
            })
            .map(|entry| entry.into_path())
            .collect();
        found.sort();
        found
    }
}

fn compile_segment(segment: &str) -> Result<Segment> {
    let regex = RegexBuilder::new(&segment_to_regex(segment))
        .case_insensitive(cfg!(windows))
        .build()
        .map_err(|e| PhileError::invalid_record(format!("无效的文件匹配模式 '{segment}': {e}")))?;
    Ok(Segment {
        regex,
        matches_hidden: segment.starts_with('.'),
    })
}

fn segment_to_regex(segment: &str) -> String {
    let chars: Vec<char> = segment.chars().collect();
    let mut out = String::from("^");
    let mut i = 0;

    while i < chars.len() {
        match chars[i] {
            '*' => out.push_str(".*"),
            '?' => out.push('.'),
            '[' => match bracket_end(&chars, i) {
                Some(end) => {
                    out.push_str(&bracket_to_class(&chars[i + 1..end]));
                    i = end;
                }
                None => out.push_str(r"\["),
            },
            c => out.push_str(&regex::escape(&c.to_string())),
        }
        i += 1;
    }

    out.push('$');
    out
}

/// `]` 紧跟在 `[` 或 `[!` 之后时按字面量处理
fn bracket_end(chars: &[char], open: usize) -> Option<usize> {
    let mut i = open + 1;
    if matches!(chars.get(i), Some('!') | Some('^')) {
        i += 1;
    }
    if chars.get(i) == Some(&']') {
        i += 1;
    }
    chars[i.min(chars.len())..]
        .iter()
        .position(|c| *c == ']')
        .map(|pos| i + pos)
}

fn bracket_to_class(body: &[char]) -> String {
    let (negated, body) = match body.first() {
        Some('!') | Some('^') => (true, &body[1..]),
        _ => (false, body),
    };

    let mut class = String::from("[");
    if negated {
        class.push('^');
    }
    for (idx, c) in body.iter().enumerate() {
        let is_range = *c == '-' && idx > 0 && idx + 1 < body.len();
        if is_range {
            class.push('-');
        } else {
            class.push_str(&regex::escape(&c.to_string()));
        }
    }
    class.push(']');
    class
}
