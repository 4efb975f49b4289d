use crate::{
    category,
    models::{BusinessRecord, RawRecord},
    util::{non_blank, strip_markup},
};

/// Characters of the lowercased address that go into a hash identity
const ADDRESS_PREFIX_LEN: usize = 20;

/// Maps raw source records into the common [`BusinessRecord`] shape
#[derive(Debug, Clone, Default)]
pub struct Normalizer {
    /// Used when a record has no address at all, e.g. "Lakeland, FL"
    fallback_address: String,
}

impl Normalizer {
    pub fn new(fallback_address: &str) -> Self {
        Self {
            fallback_address: fallback_address.into(),
        }
    }

    /// None if the record has no usable name
    pub fn normalize(&self, raw: RawRecord) -> Option<BusinessRecord> {
        let html = raw.source.is_html();
        let text = |v: Option<String>| {
            if html {
                non_blank(v.map(|s| strip_markup(&s)).as_deref())
            } else {
                non_blank(v.as_deref())
            }
        };

        let name = text(raw.name)?;
        let address = text(raw.address);
        let external_id = non_blank(raw.external_id.as_deref());
        let key = match &external_id {
            Some(id) => id.clone(),
            None => identity_hash(&name, address.as_deref().unwrap_or_default()),
        };

        Some(BusinessRecord {
            key,
            external_id,
            name,
            address: address.unwrap_or_else(|| self.fallback_address.clone()),
            category: category::label(&raw.category),
            phone: text(raw.phone),
            website: non_blank(raw.website.as_deref()),
            rating: coerce_rating(raw.rating),
            rating_count: raw.rating_count.unwrap_or(0),
            lat: coerce_coord(raw.lat),
            lng: coerce_coord(raw.lng),
            source: raw.source,
            types: non_blank(raw.types.as_deref()),
            hours: non_blank(raw.hours.as_deref()),
        })
    }
}

/// Identity for records without a source id: md5 of the lowercased name and the first
/// characters of the lowercased address
pub fn identity_hash(name: &str, address: &str) -> String {
    let prefix: String = address
        .to_lowercase()
        .chars()
        .take(ADDRESS_PREFIX_LEN)
        .collect();
    format!("{:x}", md5::compute(format!("{}{}", name.to_lowercase(), prefix)))
}

fn coerce_rating(v: Option<f64>) -> f64 {
    v.filter(|r| r.is_finite()).unwrap_or(0.0).clamp(0.0, 5.0)
}

fn coerce_coord(v: Option<f64>) -> f64 {
    v.filter(|c| c.is_finite()).unwrap_or(0.0)
}
