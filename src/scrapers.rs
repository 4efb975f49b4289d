pub mod contacts;
pub mod osm;
pub mod places;
pub mod yellowpages;
pub mod yelp;
