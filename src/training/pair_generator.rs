// src/training/pair_generator.rs

use anyhow::{Context, Result};
use base64::{engine::general_purpose::STANDARD as B64, Engine as _};
use chrono::Duration;
use image::DynamicImage;
use log::{info, warn};
use rand::seq::SliceRandom;
use rand::Rng;
use std::io::Cursor;
use std::path::Path;

use crate::matching::normalize::NicknameMap;
use crate::models::{PairVariant, PersonRecord, TrainingPairRow};
use crate::retrieval::person_from_row;
use crate::utils::db_connect::PgPool;

const DOB_JITTER_DAYS: i64 = 300;

/// Loads the full reference population for pair synthesis.
pub async fn fetch_population(pool: &PgPool) -> Result<Vec<PersonRecord>> {
    let conn = pool
        .get()
        .await
        .context("Pair generation: failed to get DB connection")?;
    let rows = conn
        .query(
            "SELECT person_id, first_nm, last_nm, birth_dt, mdm_person_id,
                    email_address, headshot_b64, face_embedding
             FROM people_with_faces
             ORDER BY person_id",
            &[],
        )
        .await
        .context("Failed to load people_with_faces population")?;
    let records: Vec<PersonRecord> = rows.iter().map(person_from_row).collect();
    info!("Loaded {} reference records for pair synthesis", records.len());
    Ok(records)
}

fn decode_b64_image(b64: &str) -> Result<DynamicImage> {
    let bytes = B64.decode(b64).context("Invalid base64 image payload")?;
    image::load_from_memory(&bytes).context("Failed to decode image bytes")
}

fn encode_png_b64(img: &DynamicImage) -> Result<String> {
    let mut buf = Cursor::new(Vec::new());
    img.write_to(&mut buf, image::ImageFormat::Png)
        .context("Failed to re-encode image")?;
    Ok(B64.encode(buf.into_inner()))
}

fn perturb_image(b64: &str, op: fn(&DynamicImage) -> DynamicImage) -> Option<String> {
    match decode_b64_image(b64).and_then(|img| encode_png_b64(&op(&img))) {
        Ok(out) => Some(out),
        Err(e) => {
            warn!("Image perturbation skipped: {}", e);
            None
        }
    }
}

fn mirrored(b64: &str) -> Option<String> {
    perturb_image(b64, |img| img.fliph())
}

fn jittered_dob(record: &PersonRecord, rng: &mut impl Rng) -> Option<chrono::NaiveDate> {
    record
        .birth_date
        .map(|d| d + Duration::days(rng.gen_range(-DOB_JITTER_DAYS..=DOB_JITTER_DAYS)))
}

fn base_row(record: &PersonRecord, variant: PairVariant) -> TrainingPairRow {
    TrainingPairRow {
        a_id: record.person_id,
        b_id: record.person_id,
        a_first: record.first_name.clone(),
        b_first: record.first_name.clone(),
        a_last: record.last_name.clone(),
        b_last: record.last_name.clone(),
        a_birth: record.birth_date,
        b_birth: record.birth_date,
        a_email: record.email.clone(),
        b_email: record.email.clone(),
        a_mdm: record.mdm_id.clone(),
        b_mdm: record.mdm_id.clone(),
        a_img: record.headshot_b64.clone(),
        b_img: record.headshot_b64.clone(),
        label: 1,
        variant,
    }
}

/// Canonical form of the record's given name, when the dictionary maps
/// it to something different.
fn canonical_for(first_name: &str, nicknames: &NicknameMap) -> Option<String> {
    let folded = first_name.trim().to_lowercase();
    nicknames.get(&folded).filter(|c| **c != folded).cloned()
}

/// Synthesizes the positive variants for a single record. Image-based
/// variants are emitted only when the headshot decodes.
pub fn positive_variants(
    record: &PersonRecord,
    nicknames: &NicknameMap,
    rng: &mut impl Rng,
) -> Vec<TrainingPairRow> {
    let mut rows = Vec::new();

    // Same person re-entered: case noise, a slightly wrong birth date
    // and a mirrored photo.
    let mut standard = base_row(record, PairVariant::Standard);
    standard.b_first = record.first_name.to_uppercase();
    standard.b_last = record.last_name.to_uppercase();
    standard.b_birth = jittered_dob(record, rng);
    if let Some(b64) = &record.headshot_b64 {
        standard.b_img = mirrored(b64);
    }
    rows.push(standard);

    // Same person, one side with no photo at all.
    let mut missing = base_row(record, PairVariant::MissingImg);
    missing.b_img = None;
    rows.push(missing);

    // Same person entered under the dictionary's canonical form of
    // the given name.
    let canonical = canonical_for(&record.first_name, nicknames);
    if let Some(canon) = &canonical {
        let mut nickname = base_row(record, PairVariant::Nickname);
        nickname.b_first = canon.clone();
        rows.push(nickname);
    }

    // Hyphenated given name joined with its canonical form, or doubled
    // onto itself when the dictionary has no entry. The surname is
    // untouched.
    let mut hybrid = base_row(record, PairVariant::Hybrid);
    hybrid.b_first = format!(
        "{}-{}",
        record.first_name,
        canonical.as_deref().unwrap_or(&record.first_name)
    );
    rows.push(hybrid);

    if let Some(b64) = &record.headshot_b64 {
        // One quarter-turn rotation per record, angle picked at random
        // from the fixed set.
        let op: fn(&DynamicImage) -> DynamicImage = if rng.gen_bool(0.5) {
            DynamicImage::rotate90
        } else {
            DynamicImage::rotate270
        };
        if let Some(img) = perturb_image(b64, op) {
            let mut rotated = base_row(record, PairVariant::Rotated);
            rotated.b_img = Some(img);
            rows.push(rotated);
        }
        if let Some(img) = perturb_image(b64, DynamicImage::rotate180) {
            let mut upside_down = base_row(record, PairVariant::Rotated180);
            upside_down.b_img = Some(img);
            rows.push(upside_down);
        }
    }

    rows
}

/// Pairs each record with a randomly chosen different record as a
/// non-match. Built from a shuffled permutation; accidental self-pairs
/// are skipped, so the count can fall slightly short of the population
/// size.
pub fn negative_pairs(population: &[PersonRecord], rng: &mut impl Rng) -> Vec<TrainingPairRow> {
    let mut shuffled: Vec<&PersonRecord> = population.iter().collect();
    shuffled.shuffle(rng);

    population
        .iter()
        .zip(shuffled)
        .filter(|(a, b)| a.person_id != b.person_id)
        .map(|(a, b)| TrainingPairRow {
            a_id: a.person_id,
            b_id: b.person_id,
            a_first: a.first_name.clone(),
            b_first: b.first_name.clone(),
            a_last: a.last_name.clone(),
            b_last: b.last_name.clone(),
            a_birth: a.birth_date,
            b_birth: b.birth_date,
            a_email: a.email.clone(),
            b_email: b.email.clone(),
            a_mdm: a.mdm_id.clone(),
            b_mdm: b.mdm_id.clone(),
            a_img: a.headshot_b64.clone(),
            b_img: b.headshot_b64.clone(),
            label: 0,
            variant: PairVariant::Random,
        })
        .collect()
}

/// Synthesizes the full labeled pair set: positive variants per record
/// plus one shuffled negative per record.
pub fn generate_training_pairs(
    population: &[PersonRecord],
    nicknames: &NicknameMap,
    rng: &mut impl Rng,
) -> Vec<TrainingPairRow> {
    let mut rows = Vec::new();
    for record in population {
        rows.extend(positive_variants(record, nicknames, rng));
    }
    let negatives = negative_pairs(population, rng);
    info!(
        "Synthesized {} positive and {} negative pairs from {} records",
        rows.len(),
        negatives.len(),
        population.len()
    );
    rows.extend(negatives);
    rows
}

pub fn write_pairs_csv(path: &Path, rows: &[TrainingPairRow]) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("Failed to create {}", path.display()))?;
    for row in rows {
        writer.serialize(row).context("Failed to write pair row")?;
    }
    writer.flush().context("Failed to flush pair file")?;
    info!("Wrote {} pairs to {}", rows.len(), path.display());
    Ok(())
}

pub fn read_pairs_csv(path: &Path) -> Result<Vec<TrainingPairRow>> {
    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("Failed to open {}", path.display()))?;
    let mut rows = Vec::new();
    for result in reader.deserialize() {
        let row: TrainingPairRow = result.context("Failed to parse pair row")?;
        rows.push(row);
    }
    info!("Read {} pairs from {}", rows.len(), path.display());
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbImage;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn tiny_png_b64() -> String {
        let img = DynamicImage::ImageRgb8(RgbImage::from_fn(4, 4, |x, y| {
            image::Rgb([(x * 60) as u8, (y * 60) as u8, 128])
        }));
        encode_png_b64(&img).unwrap()
    }

    fn person(id: i64, first: &str, last: &str, img: Option<String>) -> PersonRecord {
        PersonRecord {
            person_id: id,
            first_name: first.to_string(),
            last_name: last.to_string(),
            birth_date: chrono::NaiveDate::from_ymd_opt(1980, 1, (id as u32 % 27) + 1),
            mdm_id: Some(format!("mdm-{}", id)),
            email: Some(format!("p{}@example.com", id)),
            headshot_b64: img,
            embedding: None,
        }
    }

    fn population() -> Vec<PersonRecord> {
        let img = tiny_png_b64();
        vec![
            person(1, "Bill", "Harris", Some(img.clone())),
            person(2, "Liz", "Stone", Some(img.clone())),
            person(3, "Robert", "Miles", Some(img.clone())),
            person(4, "Anna", "Kowalski", Some(img.clone())),
            person(5, "Zofia", "Nowak", Some(img)),
        ]
    }

    fn nicknames() -> NicknameMap {
        let mut m = NicknameMap::new();
        m.insert("bill".to_string(), "william".to_string());
        m.insert("liz".to_string(), "elizabeth".to_string());
        m
    }

    #[test]
    fn every_record_yields_the_full_variant_set() {
        let pop = population();
        let mut rng = StdRng::seed_from_u64(7);
        let rows = generate_training_pairs(&pop, &nicknames(), &mut rng);

        let positives: Vec<_> = rows.iter().filter(|r| r.label == 1).collect();
        let negatives: Vec<_> = rows.iter().filter(|r| r.label == 0).collect();

        // standard + missing_img + hybrid + rotated + rotated_180 per
        // record, nickname only where the dictionary has an entry.
        assert_eq!(
            positives
                .iter()
                .filter(|r| r.variant != PairVariant::Nickname)
                .count(),
            5 * pop.len()
        );
        assert_eq!(
            positives
                .iter()
                .filter(|r| r.variant == PairVariant::Nickname)
                .count(),
            2
        );
        assert!(negatives.len() <= pop.len());
        for n in &negatives {
            assert_ne!(n.a_id, n.b_id, "negative must not be a self-pair");
        }
    }

    #[test]
    fn nickname_variant_maps_forward_to_the_canonical_form() {
        let pop = population();
        let mut rng = StdRng::seed_from_u64(7);
        let rows = generate_training_pairs(&pop, &nicknames(), &mut rng);
        let nick_row = rows
            .iter()
            .find(|r| r.variant == PairVariant::Nickname && r.a_first == "Bill")
            .unwrap();
        assert_eq!(nick_row.b_first, "william");
        assert_eq!(nick_row.label, 1);
        // No entry for a canonical-only name means no nickname variant.
        assert!(!rows
            .iter()
            .any(|r| r.variant == PairVariant::Nickname && r.a_first == "Anna"));
    }

    #[test]
    fn hybrid_variant_hyphenates_the_given_name_only() {
        let pop = population();
        let mut rng = StdRng::seed_from_u64(7);
        let rows = generate_training_pairs(&pop, &nicknames(), &mut rng);

        let mapped = rows
            .iter()
            .find(|r| r.variant == PairVariant::Hybrid && r.a_first == "Bill")
            .unwrap();
        assert_eq!(mapped.b_first, "Bill-william");
        assert_eq!(mapped.b_last, mapped.a_last, "hybrid must not alter the surname");

        // Without a dictionary entry the given name doubles onto itself.
        let plain = rows
            .iter()
            .find(|r| r.variant == PairVariant::Hybrid && r.a_first == "Anna")
            .unwrap();
        assert_eq!(plain.b_first, "Anna-Anna");
        assert_eq!(plain.b_last, plain.a_last);
    }

    #[test]
    fn exactly_one_quarter_turn_rotation_per_record() {
        let pop = population();
        let mut rng = StdRng::seed_from_u64(7);
        let rows = generate_training_pairs(&pop, &nicknames(), &mut rng);
        for record in &pop {
            let rotated = rows
                .iter()
                .filter(|r| r.variant == PairVariant::Rotated && r.a_id == record.person_id)
                .count();
            assert_eq!(rotated, 1, "person {} rotated variants", record.person_id);
        }
    }

    #[test]
    fn standard_variant_jitters_dob_within_bound() {
        let pop = population();
        let mut rng = StdRng::seed_from_u64(7);
        let rows = generate_training_pairs(&pop, &nicknames(), &mut rng);
        for row in rows.iter().filter(|r| r.variant == PairVariant::Standard) {
            let (a, b) = (row.a_birth.unwrap(), row.b_birth.unwrap());
            assert!((b - a).num_days().abs() <= DOB_JITTER_DAYS);
        }
    }

    #[test]
    fn image_variants_are_skipped_without_a_headshot() {
        let pop = vec![person(1, "Anna", "Kowalski", None)];
        let mut rng = StdRng::seed_from_u64(7);
        let rows = generate_training_pairs(&pop, &NicknameMap::new(), &mut rng);
        assert!(rows
            .iter()
            .all(|r| r.variant != PairVariant::Rotated && r.variant != PairVariant::Rotated180));
        // standard + missing_img + hybrid survive.
        assert_eq!(rows.iter().filter(|r| r.label == 1).count(), 3);
    }

    #[test]
    fn pair_file_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pairs.csv");
        let pop = population();
        let mut rng = StdRng::seed_from_u64(7);
        let rows = generate_training_pairs(&pop, &nicknames(), &mut rng);

        write_pairs_csv(&path, &rows).unwrap();
        let back = read_pairs_csv(&path).unwrap();

        assert_eq!(back.len(), rows.len());
        assert_eq!(back[0].a_id, rows[0].a_id);
        assert_eq!(back[0].label, rows[0].label);
        assert_eq!(back[0].variant, rows[0].variant);
        assert_eq!(back[0].b_img, rows[0].b_img);
    }

    #[test]
    fn mirrored_image_differs_but_decodes() {
        let b64 = tiny_png_b64();
        let flipped = mirrored(&b64).unwrap();
        assert_ne!(flipped, b64);
        decode_b64_image(&flipped).unwrap();
    }
}
