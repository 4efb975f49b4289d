// The controlled vocabulary every record's category is translated into.

use crate::{models::CategoryHint, util::title_case};
use lazy_static::lazy_static;
use std::collections::HashMap;

pub const FALLBACK: &str = "Local Business";

/// OSM tag keys that mark something as a business, in the order they are consulted
pub const OSM_KEYS: &[&str] = &["shop", "amenity", "office", "craft", "healthcare", "leisure"];

lazy_static! {
    static ref OSM_TAGS: HashMap<&'static str, &'static str> = HashMap::from([
        // shops
        ("supermarket", "Grocery"),
        ("convenience", "Convenience Store"),
        ("clothes", "Clothing"),
        ("electronics", "Electronics"),
        ("hardware", "Hardware Store"),
        ("furniture", "Furniture"),
        ("car_repair", "Auto Repair"),
        ("car", "Car Dealership"),
        ("car_parts", "Auto Parts"),
        ("beauty", "Beauty Supply"),
        ("hairdresser", "Hair Salon"),
        ("florist", "Florist"),
        ("jewelry", "Jewelry Store"),
        ("optician", "Optician"),
        ("pet", "Pet Store"),
        ("shoes", "Shoe Store"),
        ("mobile_phone", "Phone Repair"),
        ("tobacco", "Vape/Smoke Shop"),
        ("e-cigarette", "Vape Shop"),
        ("alcohol", "Liquor Store"),
        ("bakery", "Bakery"),
        ("butcher", "Butcher"),
        ("tyres", "Tire Shop"),
        ("bicycle", "Bike Shop"),
        ("books", "Book Store"),
        ("gift", "Gift Shop"),
        ("department_store", "Department Store"),
        ("mall", "Shopping Mall"),
        ("storage_rental", "Storage"),
        ("pawnbroker", "Pawn Shop"),
        ("second_hand", "Thrift Store"),
        ("tattoo", "Tattoo Shop"),
        ("massage", "Massage"),
        ("laundry", "Laundromat"),
        ("dry_cleaning", "Dry Cleaning"),
        // amenities
        ("restaurant", "Restaurant"),
        ("fast_food", "Fast Food"),
        ("cafe", "Cafe"),
        ("bar", "Bar & Nightlife"),
        ("pub", "Bar & Nightlife"),
        ("ice_cream", "Ice Cream"),
        ("pharmacy", "Pharmacy"),
        ("bank", "Bank"),
        ("fuel", "Gas Station"),
        ("car_wash", "Car Wash"),
        ("dentist", "Dentist"),
        ("doctors", "Doctor"),
        ("hospital", "Hospital"),
        ("veterinary", "Veterinarian"),
        ("gym", "Gym & Fitness"),
        ("fitness_centre", "Gym & Fitness"),
        ("childcare", "Daycare"),
        ("kindergarten", "Daycare"),
        ("school", "School"),
        ("place_of_worship", "Church"),
        ("community_centre", "Community Center"),
        // offices
        ("lawyer", "Attorney"),
        ("accountant", "Accountant"),
        ("insurance", "Insurance"),
        ("estate_agent", "Real Estate"),
        ("financial", "Financial Services"),
        ("tax_advisor", "Tax Preparation"),
        // crafts
        ("plumber", "Plumbing"),
        ("electrician", "Electrical"),
        ("hvac", "HVAC"),
        ("painter", "Painting"),
        ("roofer", "Roofing"),
        ("carpenter", "Carpentry"),
        ("locksmith", "Locksmith"),
        // healthcare
        ("chiropractor", "Chiropractor"),
        ("optometrist", "Optometrist"),
        ("physiotherapist", "Physical Therapy"),
        // leisure
        ("spa", "Spa"),
        ("bowling_alley", "Bowling"),
        ("golf_course", "Golf"),
    ]);

    static ref DIRECTORY_SLUGS: HashMap<&'static str, &'static str> = HashMap::from([
        ("hvac", "HVAC"),
        ("plumbers", "Plumbing"),
        ("roofing", "Roofing"),
        ("electricians", "Electrical"),
        ("pest_control", "Pest Control"),
        ("landscaping", "Landscaping"),
        ("painters", "Painting"),
        ("carpet_cleaning", "Carpet Cleaning"),
        ("handyman", "Handyman"),
        ("garage_door_services", "Garage Door"),
        ("fences_gates", "Fencing"),
        ("tree_services", "Tree Service"),
        ("pressure_washers", "Pressure Washing"),
        ("pool_cleaners", "Pool Service"),
        ("locksmiths", "Locksmith"),
        ("movers", "Moving"),
        ("house_cleaning", "Cleaning Service"),
        ("flooring", "Flooring"),
        ("home_inspectors", "Home Inspector"),
        ("auto_repair", "Auto Repair"),
        ("car_dealers", "Car Dealership"),
        ("body_shops", "Auto Body"),
        ("tires", "Tire Shop"),
        ("towing", "Towing"),
        ("car_wash", "Car Wash"),
        ("restaurants", "Restaurant"),
        ("bars", "Bar & Nightlife"),
        ("coffee", "Cafe & Coffee"),
        ("bakeries", "Bakery"),
        ("pizza", "Pizza"),
        ("dentists", "Dentist"),
        ("chiropractors", "Chiropractor"),
        ("gyms", "Gym & Fitness"),
        ("yoga", "Yoga Studio"),
        ("day_spas", "Spa"),
        ("barbers", "Barber Shop"),
        ("hair_salons", "Hair Salon"),
        ("nail_salons", "Nail Salon"),
        ("massage_therapy", "Massage"),
        ("veterinarians", "Veterinarian"),
        ("lawyers", "Attorney"),
        ("accountants", "Accountant"),
        ("real_estate_agents", "Real Estate"),
        ("insurance", "Insurance"),
        ("vape_shops", "Vape Shop"),
        ("pet_stores", "Pet Store"),
        ("hardware_stores", "Hardware Store"),
        ("thrift_stores", "Thrift Store"),
        ("jewelry", "Jewelry Store"),
        ("mobile_phone_repair", "Phone Repair"),
        ("child_care", "Daycare"),
        ("self_storage", "Storage"),
        ("photographers", "Photographer"),
        ("wedding_planning", "Wedding Venue"),
    ]);
}

/// Substring rules for free-text niches, first match wins
const NICHE_RULES: &[(&[&str], &str)] = &[
    (&["hvac", "heating", "cooling", "air"], "HVAC"),
    (&["plumb"], "Plumbing"),
    (&["roof"], "Roofing"),
    (&["electric"], "Electrical"),
    (&["lawn", "landscape"], "Landscaping"),
    (&["pest"], "Pest Control"),
    (&["tow"], "Towing"),
    (&["locksmith"], "Locksmith"),
    (&["law", "legal", "attorney"], "Legal Services"),
    (&["water", "restoration", "flood"], "Water Damage Restoration"),
    (&["clean"], "Cleaning Services"),
];

/// Label for a tag, from either table. Tags are matched exactly.
pub fn lookup(tag: &str) -> Option<&'static str> {
    OSM_TAGS
        .get(tag)
        .or_else(|| DIRECTORY_SLUGS.get(tag))
        .copied()
}

pub fn infer_niche(niche: &str) -> &'static str {
    let niche = niche.to_lowercase();
    NICHE_RULES
        .iter()
        .find(|(needles, _)| needles.iter().any(|n| niche.contains(n)))
        .map(|(_, label)| *label)
        .unwrap_or(FALLBACK)
}

/// Translate a hint into a vocabulary label. Never fails; unknown input gives [`FALLBACK`].
pub fn label(hint: &CategoryHint) -> String {
    match hint {
        CategoryHint::None => FALLBACK.into(),
        CategoryHint::Tags(tags) => tags
            .iter()
            .find_map(|t| lookup(t))
            .unwrap_or(FALLBACK)
            .into(),
        CategoryHint::Term(term) => match DIRECTORY_SLUGS.get(term.trim()) {
            Some(v) => (*v).into(),
            None => {
                let t = title_case(&term.replace('_', " "));
                if t.is_empty() { FALLBACK.into() } else { t }
            }
        },
        CategoryHint::Niche(niche) => infer_niche(niche).into(),
    }
}
