//! Series title helpers
//!
//! Media servers report episode names like `咒术回战 S1E47 关门`; catalogs want
//! the bare series title, with a Chinese season marker from the second
//! season on (`葬送的芙莉莲 第二季`).

use regex::Regex;
use std::sync::LazyLock;

static EPISODE_MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\s+S\d+\s*E\d+").expect("valid episode marker regex"));

const DIGITS: [&str; 10] = ["零", "一", "二", "三", "四", "五", "六", "七", "八", "九"];

/// Title before the ` S<n>E<n>` marker, or the whole trimmed name
pub fn series_title(item_name: &str) -> String {
    let name = item_name.trim();
    match EPISODE_MARKER.find(name) {
        Some(m) => name[..m.start()].trim().to_string(),
        None => name.to_string(),
    }
}

/// Title up to the first whitespace
pub fn first_word(item_name: &str) -> String {
    item_name
        .split_whitespace()
        .next()
        .unwrap_or_default()
        .to_string()
}

/// Chinese numeral for 0..=99
pub fn chinese_number(n: u32) -> String {
    match n {
        0..=9 => DIGITS[n as usize].to_string(),
        10 => "十".to_string(),
        11..=19 => format!("十{}", DIGITS[(n % 10) as usize]),
        20..=99 if n % 10 == 0 => format!("{}十", DIGITS[(n / 10) as usize]),
        20..=99 => format!("{}十{}", DIGITS[(n / 10) as usize], DIGITS[(n % 10) as usize]),
        _ => n.to_string(),
    }
}

/// Append ` 第<n>季` for seasons after the first
pub fn season_title(title: &str, season: u32) -> String {
    if season < 2 {
        title.to_string()
    } else {
        format!("{} 第{}季", title, chinese_number(season))
    }
}
