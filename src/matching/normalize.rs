// src/matching/normalize.rs

use anyhow::{Context, Result};
use log::{debug, warn};
use std::collections::HashMap;

use crate::utils::db_connect::PgPool;

/// nickname (lower-cased) -> canonical full form (lower-cased).
pub type NicknameMap = HashMap<String, String>;

/// Loads the nickname-canonicalization table. If the table is
/// unreachable the pipeline degrades to the identity mapping (an empty
/// map) rather than failing the request.
pub async fn load_nickname_map(pool: &PgPool) -> NicknameMap {
    match try_load_nickname_map(pool).await {
        Ok(map) => {
            debug!("Loaded {} nickname mappings", map.len());
            map
        }
        Err(e) => {
            warn!(
                "Nickname table unreachable, degrading to case-fold only: {}",
                e
            );
            NicknameMap::new()
        }
    }
}

/// Fallible variant for callers that need to observe the degradation.
pub async fn try_load_nickname_map(pool: &PgPool) -> Result<NicknameMap> {
    let conn = pool
        .get()
        .await
        .context("Nicknames: failed to get DB connection")?;

    let rows = conn
        .query("SELECT nickname, canonical FROM nicknames", &[])
        .await
        .context("Failed to query nicknames table")?;

    let mut map = NicknameMap::with_capacity(rows.len());
    for row in rows {
        let nickname: String = row.get("nickname");
        let canonical: String = row.get("canonical");
        map.insert(nickname.to_lowercase(), canonical.to_lowercase());
    }
    Ok(map)
}

/// Canonicalizes a given name through the nickname dictionary,
/// case-insensitively. Unmapped names pass through case-folded.
pub fn normalize_name(name: &str, nickname_map: &NicknameMap) -> String {
    let folded = name.trim().to_lowercase();
    nickname_map.get(&folded).cloned().unwrap_or(folded)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map() -> NicknameMap {
        let mut m = NicknameMap::new();
        m.insert("bill".to_string(), "william".to_string());
        m.insert("liz".to_string(), "elizabeth".to_string());
        m
    }

    #[test]
    fn nickname_maps_to_canonical_case_insensitively() {
        assert_eq!(normalize_name("Bill", &map()), "william");
        assert_eq!(normalize_name("BILL", &map()), "william");
    }

    #[test]
    fn unmapped_name_is_case_folded_only() {
        assert_eq!(normalize_name("Gertrude", &map()), "gertrude");
    }

    #[test]
    fn empty_map_is_identity_plus_case_fold() {
        assert_eq!(normalize_name("Bill", &NicknameMap::new()), "bill");
    }

    #[test]
    fn surrounding_whitespace_is_trimmed() {
        assert_eq!(normalize_name("  Liz ", &map()), "elizabeth");
    }
}
