use regex::Regex;
use std::sync::OnceLock;

fn price_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"(\d+(?:\.\d+)?)").unwrap())
}

/// 從 "$325"、"USD 1,250.00" 之類的文字取出第一個數字
pub fn parse_price(text: &str) -> Option<f64> {
    let cleaned = text.replace(',', "");
    let caps = price_pattern().captures(&cleaned)?;
    caps[1].parse::<f64>().ok()
}
