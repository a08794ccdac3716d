//! Source tags
//!
//! Current tags are dotted triples `family.period.country`, for example
//! `sale-in.daily.ua`. Producers still on the first schema generation send
//! tags starting with the conversion marker `data.`; those are mapped to a
//! current tag through a fixed migration table.

use serde::Deserialize;

/// Prefix selecting the legacy conversion path
pub const CONVERSION_MARKER: &str = "data.";

/// Dataset families
pub const FAMILIES: [&str; 3] = ["sale-in", "sale-out", "geo"];

/// Reporting periods
pub const PERIODS: [&str; 3] = ["daily", "weekly", "monthly"];

/// Country codes
pub const COUNTRIES: [&str; 4] = ["ua", "ru", "kz", "by"];

/// Old dotted names → current tags
const MIGRATIONS: &[(&str, &str)] = &[
    ("data.sale-inp.daily", "sale-in.daily.ua"),
    ("data.sale-inp.weekly", "sale-in.weekly.ua"),
    ("data.sale-inp.monthly", "sale-in.monthly.ua"),
    ("data.sale-out.daily", "sale-out.daily.ua"),
    ("data.sale-out.weekly", "sale-out.weekly.ua"),
    ("data.sale-out.monthly", "sale-out.monthly.ua"),
    ("data.sale-inp.daily.ru", "sale-in.daily.ru"),
    ("data.sale-out.daily.ru", "sale-out.daily.ru"),
    ("data.sale-inp.monthly.ru", "sale-in.monthly.ru"),
    ("data.sale-out.monthly.ru", "sale-out.monthly.ru"),
    ("data.sale-inp.daily.kz", "sale-in.daily.kz"),
    ("data.sale-out.daily.kz", "sale-out.daily.kz"),
    ("data.sale-inp.monthly.kz", "sale-in.monthly.kz"),
    ("data.sale-out.monthly.kz", "sale-out.monthly.kz"),
    ("data.sale-inp.daily.by", "sale-in.daily.by"),
    ("data.sale-out.daily.by", "sale-out.daily.by"),
    ("data.geo.apteka", "geo.monthly.ua"),
    ("data.geo.apteka.kz", "geo.monthly.kz"),
];

/// Country a tag reports for; selects the drug-key suffix
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Country {
    #[default]
    Ua,
    Ru,
    Kz,
    By,
}

impl Country {
    /// Country from the last dotted segment of a tag
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag.rsplit('.').next()? {
            "ua" => Some(Country::Ua),
            "ru" => Some(Country::Ru),
            "kz" => Some(Country::Kz),
            "by" => Some(Country::By),
            _ => None,
        }
    }

    /// JSON literal appended to drug names before hashing
    pub fn drug_key_suffix(self) -> &'static str {
        match self {
            Country::Ua => "",
            Country::Ru => r#"{"country":"RU"}"#,
            Country::Kz => r#"{"country":"KZ"}"#,
            Country::By => r#"{"country":"BY"}"#,
        }
    }
}

/// True when `tag` selects the legacy conversion path
pub fn is_legacy(tag: &str) -> bool {
    tag.starts_with(CONVERSION_MARKER)
}

/// Current tag for a legacy tag, if the migration table knows it
pub fn migrate(tag: &str) -> Option<&'static str> {
    MIGRATIONS
        .iter()
        .find(|(old, _)| *old == tag)
        .map(|(_, new)| *new)
}

/// True when `tag` is on the allowlist of current tags
pub fn is_known(tag: &str) -> bool {
    let mut parts = tag.split('.');
    let (Some(family), Some(period), Some(country), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return false;
    };
    FAMILIES.contains(&family) && PERIODS.contains(&period) && COUNTRIES.contains(&country)
}

/// True when the tag belongs to the sale-in family
pub fn is_sale_in(tag: &str) -> bool {
    tag.contains("sale-in")
}
