use serde::{Deserialize, Serialize};
use std::fmt::Display;

/// A geographic coordinate plus search radius used to bound a query
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AnchorPoint {
    pub name: String,
    pub lat: f64,
    pub lng: f64,
    /// Search radius in meters
    pub radius_m: u32,
}

impl AnchorPoint {
    pub fn new(name: &str, lat: f64, lng: f64, radius_m: u32) -> Self {
        Self {
            name: name.into(),
            lat,
            lng,
            radius_m,
        }
    }
}

impl Display for AnchorPoint {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{} ({}, {})", self.name, self.lat, self.lng)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    /// Search term. Empty for whole-area queries.
    pub term: String,
    pub anchor: AnchorPoint,
}

impl Query {
    pub fn new(term: &str, anchor: AnchorPoint) -> Self {
        Self {
            term: term.into(),
            anchor,
        }
    }

    /// A query for sources that return everything within an area in one go
    pub fn area(anchor: AnchorPoint) -> Self {
        Self {
            term: String::new(),
            anchor,
        }
    }

    pub fn is_area(&self) -> bool {
        self.term.is_empty()
    }
}

impl Display for Query {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        if self.is_area() {
            write!(f, "<area> @ {}", self.anchor)
        } else {
            write!(f, "{} @ {}", self.term, self.anchor)
        }
    }
}

/// Terms x anchors. Stateless, so `iter()` can be called any number of times and yields the
/// same sequence each time.
#[derive(Debug, Clone, Default)]
pub struct QueryPlan {
    terms: Vec<String>,
    anchors: Vec<AnchorPoint>,
}

impl QueryPlan {
    pub fn new<T: AsRef<str>>(terms: &[T], anchors: &[AnchorPoint]) -> Self {
        Self {
            terms: terms.iter().map(|t| t.as_ref().to_string()).collect(),
            anchors: anchors.to_vec(),
        }
    }

    pub fn len(&self) -> usize {
        self.terms.len() * self.anchors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Term-major: every anchor for the first term, then every anchor for the second, ...
    pub fn iter(&self) -> impl Iterator<Item = Query> + '_ {
        self.terms.iter().flat_map(move |t| {
            self.anchors
                .iter()
                .map(move |a| Query::new(t, a.clone()))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn points() -> Vec<AnchorPoint> {
        vec![
            AnchorPoint::new("P1", 28.0395, -81.9498, 8000),
            AnchorPoint::new("P2", 28.08, -81.95, 8000),
        ]
    }

    #[test]
    fn term_major_product() {
        let plan = QueryPlan::new(&["plumber", "electrician"], &points());
        let got: Vec<(String, String)> = plan
            .iter()
            .map(|q| (q.term, q.anchor.name))
            .collect();
        assert_eq!(
            vec![
                ("plumber".to_string(), "P1".to_string()),
                ("plumber".to_string(), "P2".to_string()),
                ("electrician".to_string(), "P1".to_string()),
                ("electrician".to_string(), "P2".to_string()),
            ],
            got
        );
        assert_eq!(4, plan.len());
    }

    #[test]
    fn restartable() {
        let plan = QueryPlan::new(&["a", "b", "c"], &points());
        let first: Vec<Query> = plan.iter().collect();
        let second: Vec<Query> = plan.iter().collect();
        assert_eq!(first, second);
        assert_eq!(6, first.len());
    }

    #[test]
    fn empty_inputs_yield_nothing() {
        let no_terms: [&str; 0] = [];
        assert!(QueryPlan::new(&no_terms, &points()).iter().next().is_none());
        assert!(QueryPlan::new(&["a"], &[]).is_empty());
    }

    #[test]
    fn area_query() {
        let q = Query::area(points().remove(0));
        assert!(q.is_area());
        assert!(q.to_string().starts_with("<area>"));
    }
}
