//! Content-addressed registry keys
//!
//! A key is the hex SHA-256 of a normalized name: the trimmed name cut to a
//! fixed number of characters, plus a country suffix for drug names.

use crate::model::MetaRecord;
use crate::normalizer::Country;
use sha2::{Digest, Sha256};

/// Characters of a drug name that take part in its key
pub const DRUG_NAME_CHARS: usize = 512;

/// Characters of a supplier or point-of-sale name that take part in its key
pub const ADDR_NAME_CHARS: usize = 1024;

fn truncate(name: &str, chars: usize) -> &str {
    let name = name.trim();
    match name.char_indices().nth(chars) {
        Some((end, _)) => &name[..end],
        None => name,
    }
}

/// Hex SHA-256 of `source`
pub fn hash_key(source: &str) -> String {
    format!("{:x}", Sha256::digest(source.as_bytes()))
}

/// Key source of a drug display name
pub fn drug_key_source(name: &str, country: Country) -> String {
    let mut source = truncate(name, DRUG_NAME_CHARS).to_string();
    source.push_str(country.drug_key_suffix());
    source
}

/// Key source of a supplier name
pub fn addr_key_source(supplier: &str) -> String {
    truncate(supplier, ADDR_NAME_CHARS).to_string()
}

/// Key source of the submission's own point of sale: `name/head: addr`
pub fn point_of_sale_key_source(meta: &MetaRecord) -> String {
    let composed = format!(
        "{}/{}: {}",
        meta.name.trim(),
        meta.head.trim(),
        meta.addr.trim()
    );
    truncate(&composed, ADDR_NAME_CHARS).to_string()
}

/// Registry key of a drug display name
pub fn drug_key(name: &str, country: Country) -> String {
    hash_key(&drug_key_source(name, country))
}

/// Registry key of a supplier name
pub fn addr_key(supplier: &str) -> String {
    hash_key(&addr_key_source(supplier))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_is_sha256_hex() {
        assert_eq!(
            hash_key("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_drug_key_trims_and_suffixes() {
        assert_eq!(drug_key("  Aspirin 500mg ", Country::Ua), hash_key("Aspirin 500mg"));
        assert_ne!(drug_key("Aspirin 500mg", Country::Ru), drug_key("Aspirin 500mg", Country::Ua));
        assert_eq!(
            drug_key_source("Aspirin", Country::Kz),
            format!("Aspirin{}", Country::Kz.drug_key_suffix())
        );
    }

    #[test]
    fn test_truncation_counts_characters() {
        let long = "я".repeat(DRUG_NAME_CHARS + 10);
        let source = drug_key_source(&long, Country::Ua);
        assert_eq!(source.chars().count(), DRUG_NAME_CHARS);

        let long = "x".repeat(ADDR_NAME_CHARS * 2);
        assert_eq!(addr_key_source(&long).len(), ADDR_NAME_CHARS);
    }

    #[test]
    fn test_point_of_sale_source() {
        let meta = MetaRecord {
            name: "Pharmacy #12".to_string(),
            head: "Apteka LLC".to_string(),
            addr: " Kyiv ".to_string(),
            ..Default::default()
        };
        assert_eq!(point_of_sale_key_source(&meta), "Pharmacy #12/Apteka LLC: Kyiv");
    }
}
