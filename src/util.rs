use lazy_static::lazy_static;
use nom::number::complete;
use regex::Regex;
use scraper::{ElementRef, Selector};

lazy_static! {
    static ref RE_TAG: Regex = Regex::new(r"<[^>]+>").unwrap();
}

pub fn sel(selector: &str) -> Selector {
    Selector::parse(selector).unwrap()
}

/// All text below the first match of `sel`, whitespace reduced. None if nothing matched or the
/// text is blank.
pub fn get_text(e: &ElementRef, sel: &Selector) -> Option<String> {
    e.select(sel)
        .next()
        .map(|v| reduce_whitespace(&v.text().collect::<String>()))
        .filter(|v| !v.is_empty())
}

pub fn get_attr(e: &ElementRef, sel: &Selector, attr: &str) -> Option<String> {
    e.select(sel)
        .next()
        .and_then(|v| v.attr(attr))
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Parse the leading float in `s`, 0.0 if there is none
pub fn parse_float(s: &str) -> f64 {
    match complete::double::<_, ()>(s.trim()) {
        Ok((_, v)) if v.is_finite() => v,
        _ => 0.0,
    }
}

pub fn reduce_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<&str>>().join(" ")
}

/// Remove tags and decode the handful of entities the directory sites actually emit
pub fn strip_markup(s: &str) -> String {
    let s = RE_TAG.replace_all(s, " ");
    let s = s
        .replace("&nbsp;", " ")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&#x27;", "'")
        .replace("&apos;", "'")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&");
    reduce_whitespace(&s)
}

/// "hvac contractor" -> "Hvac Contractor"
pub fn title_case(s: &str) -> String {
    s.split_whitespace()
        .map(|w| {
            let mut c = w.chars();
            match c.next() {
                None => String::new(),
                Some(first) => first
                    .to_uppercase()
                    .chain(c.flat_map(char::to_lowercase))
                    .collect(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Trimmed, None when blank
pub fn non_blank(s: Option<&str>) -> Option<String> {
    s.map(str::trim).filter(|v| !v.is_empty()).map(String::from)
}
