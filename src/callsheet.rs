// Cold call sheet built from an export: every business with a phone, easiest sell first, each
// with a hook and an opener line for the caller.

use crate::models::BusinessRecord;
use anyhow::{Context, Result};
use serde::Serialize;
use std::{fmt::Display, fs::File, io::BufWriter, io::Write, path::Path};
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Priority {
    /// No website
    #[serde(rename = "HIGH")]
    High,
    /// Poorly rated, with enough reviews to matter
    #[serde(rename = "MEDIUM")]
    Medium,
    /// Top rated
    #[serde(rename = "WARM")]
    Warm,
    #[serde(rename = "STANDARD")]
    Standard,
}

impl Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.write_str(match self {
            Self::High => "HIGH",
            Self::Medium => "MEDIUM",
            Self::Warm => "WARM",
            Self::Standard => "STANDARD",
        })
    }
}

/// Who is calling, and about where
#[derive(Debug, Clone)]
pub struct Pitch {
    pub city: String,
    pub directory_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CallRow {
    #[serde(rename = "Priority")]
    pub priority: Priority,
    #[serde(rename = "Business Name")]
    pub name: String,
    #[serde(rename = "Phone")]
    pub phone: String,
    #[serde(rename = "Category")]
    pub category: String,
    #[serde(rename = "Rating")]
    pub rating: String,
    #[serde(rename = "Website")]
    pub website: String,
    #[serde(rename = "Address")]
    pub address: String,
    #[serde(rename = "Hook")]
    pub hook: String,
    #[serde(rename = "Opener")]
    pub opener: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CallSheetStats {
    /// Records in
    pub considered: usize,
    pub high: usize,
    pub medium: usize,
    pub warm: usize,
    pub standard: usize,
}

impl CallSheetStats {
    pub fn total(&self) -> usize {
        self.high + self.medium + self.warm + self.standard
    }

    fn count(&mut self, p: Priority) {
        match p {
            Priority::High => self.high += 1,
            Priority::Medium => self.medium += 1,
            Priority::Warm => self.warm += 1,
            Priority::Standard => self.standard += 1,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct CallSheet {
    pub rows: Vec<CallRow>,
    pub stats: CallSheetStats,
}

pub fn priority(r: &BusinessRecord) -> Priority {
    if !r.has_website() {
        Priority::High
    } else if r.rating > 0.0 && r.rating < 3.5 && r.rating_count >= 5 {
        Priority::Medium
    } else if r.rating >= 4.5 && r.rating_count >= 50 {
        Priority::Warm
    } else {
        Priority::Standard
    }
}

/// "4.0" rather than "4"
fn stars(rating: f64) -> String {
    format!("{rating:?}★")
}

fn rating_label(r: &BusinessRecord) -> String {
    if r.rating > 0.0 {
        format!("{} ({})", stars(r.rating), r.rating_count)
    } else {
        "No reviews".into()
    }
}

fn hook_and_opener(r: &BusinessRecord, p: Priority, pitch: &Pitch) -> (String, String) {
    let category = r.category.to_lowercase();
    let rating = stars(r.rating);
    let total = r.rating_count;
    match p {
        Priority::High => {
            let opener = if r.rating >= 4.5 && total >= 20 {
                format!(
                    "Your customers love you ({rating}, {total} reviews) but you have no website, so people searching online can't find you. We can fix that."
                )
            } else if r.rating >= 4.0 {
                format!(
                    "You've got great reviews ({rating}) but no website. People searching 'best {category} {}' can't find you online.",
                    pitch.city
                )
            } else {
                "I noticed you don't have a website yet. These days most customers search online first, and we can help you get set up.".into()
            };
            ("NO WEBSITE: needs online presence".into(), opener)
        }
        Priority::Medium => (
            format!("LOW REVIEWS ({rating}): reputation management"),
            format!(
                "I noticed your rating is {rating}, which can hurt when customers are comparing options. We help businesses improve their online reputation."
            ),
        ),
        Priority::Warm => (
            format!("TOP RATED ({rating}, {total} reviews): premium listing"),
            format!(
                "You're one of the top-rated {category} businesses in {} ({rating}, {total} reviews). We'd love to feature you prominently on our directory.",
                pitch.city
            ),
        ),
        Priority::Standard => (
            "Directory listing awareness".into(),
            format!(
                "I'm calling from {}, a new business directory for the area. We've already listed your business and wanted to let you know you can claim your listing for free.",
                pitch.directory_name
            ),
        ),
    }
}

fn row(r: &BusinessRecord, pitch: &Pitch) -> CallRow {
    let p = priority(r);
    let (hook, opener) = hook_and_opener(r, p, pitch);
    CallRow {
        priority: p,
        name: r.name.clone(),
        phone: r.phone.clone().unwrap_or_default(),
        category: r.category.clone(),
        rating: rating_label(r),
        website: r.website.clone().unwrap_or_else(|| "NONE".into()),
        address: r.address.clone(),
        hook,
        opener,
    }
}

/// Records without a phone are left out. Businesses without a website come first, best rated
/// first; the rest follow worst rated first. Ties keep input order.
pub fn build(records: &[BusinessRecord], pitch: &Pitch) -> CallSheet {
    let (mut no_site, mut with_site): (Vec<&BusinessRecord>, Vec<&BusinessRecord>) = records
        .iter()
        .filter(|r| r.has_phone())
        .partition(|r| !r.has_website());
    no_site.sort_by(|a, b| b.rating.total_cmp(&a.rating));
    with_site.sort_by(|a, b| a.rating.total_cmp(&b.rating));

    let mut sheet = CallSheet {
        stats: CallSheetStats {
            considered: records.len(),
            ..Default::default()
        },
        ..Default::default()
    };
    for r in no_site.into_iter().chain(with_site) {
        let row = row(r, pitch);
        sheet.stats.count(row.priority);
        sheet.rows.push(row);
    }
    sheet
}

pub fn write_rows<W: Write>(w: W, rows: &[CallRow]) -> Result<()> {
    let mut wtr = csv::Writer::from_writer(w);
    if rows.is_empty() {
        wtr.write_record([
            "Priority",
            "Business Name",
            "Phone",
            "Category",
            "Rating",
            "Website",
            "Address",
            "Hook",
            "Opener",
        ])?;
    }
    for r in rows {
        wtr.serialize(r)?;
    }
    wtr.flush()?;
    Ok(())
}

pub fn write_file<P: AsRef<Path>>(path: P, sheet: &CallSheet) -> Result<()> {
    let path = path.as_ref();
    let f = File::create(path).with_context(|| format!("failed to create {}", path.display()))?;
    write_rows(BufWriter::new(f), &sheet.rows)?;
    info!(
        path = %path.display(),
        calls = sheet.stats.total(),
        high = sheet.stats.high,
        medium = sheet.stats.medium,
        warm = sheet.stats.warm,
        standard = sheet.stats.standard,
        "Call sheet written"
    );
    Ok(())
}
