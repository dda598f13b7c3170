// SPDX-License-Identifier: MIT
// Copyright (c) 2026 LightRun contributors

use lightrun_core::itinerary::{
    AddOutcome, ItineraryEntry, ItineraryStore, DUPLICATE_WARNING, RUN_KEY, UNNAMED_DISPLAY,
};
use lightrun_core::leaderboard::{add_row_to_run, LeaderboardRow};
use lightrun_core::storage::{FileStore, KeyValueStore};
use std::sync::Arc;
use tempfile::tempdir;

fn stop(id: &str, lat: f64, lng: f64) -> ItineraryEntry {
    ItineraryEntry {
        id: id.to_string(),
        address: format!("{} Candy Cane Crescent", id),
        suburb: Some("Mudgeeraba".to_string()),
        lat,
        lng,
    }
}

#[test]
fn test_duplicate_add_warns_and_keeps_single_entry() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let storage = Arc::new(FileStore::new(dir.path()));
    let mut run = ItineraryStore::load(storage.clone());

    assert_eq!(run.add(stop("7", -28.1, 153.4))?, AddOutcome::Added);
    let after_first = storage.get(RUN_KEY)?;

    let second = run.add(stop("7", -28.1, 153.4))?;
    assert_eq!(second, AddOutcome::AlreadyPresent(DUPLICATE_WARNING));
    assert_eq!(run.len(), 1);
    assert_eq!(storage.get(RUN_KEY)?, after_first, "Duplicate add must not rewrite storage");

    Ok(())
}

#[test]
fn test_every_mutation_is_persisted_before_returning() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let storage = Arc::new(FileStore::new(dir.path()));

    let mut run = ItineraryStore::load(storage.clone());
    run.add(stop("a", -27.9, 153.3))?;
    run.add(stop("b", -27.95, 153.35))?;
    run.add(stop("c", -28.0, 153.4))?;
    run.remove("b")?;

    // A fresh load (simulating a page reload) sees exactly the same run
    let reloaded = ItineraryStore::load(storage.clone());
    assert_eq!(reloaded.entries(), run.entries());
    let ids: Vec<_> = reloaded.entries().iter().map(|e| e.id.as_str()).collect();
    assert_eq!(ids, vec!["a", "c"]);

    run.clear()?;
    assert!(ItineraryStore::load(storage).is_empty());
    Ok(())
}

#[test]
fn test_save_then_load_roundtrip() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let storage = Arc::new(FileStore::new(dir.path()));
    let saved = vec![
        stop("1", -27.9, 153.3),
        ItineraryEntry {
            id: "2".to_string(),
            address: String::new(),
            suburb: None,
            lat: -27.95,
            lng: 153.35,
        },
        stop("3", -28.0, 153.4),
    ];

    let mut run = ItineraryStore::load(storage.clone());
    run.replace_all(saved.clone())?;

    assert_eq!(ItineraryStore::load(storage).entries(), saved.as_slice());
    Ok(())
}

#[test]
fn test_malformed_entries_are_dropped() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let storage = Arc::new(FileStore::new(dir.path()));
    storage.set(
        RUN_KEY,
        r#"[
            {"id": "1", "address": "1 Elf St", "suburb": null, "lat": -27.9, "lng": 153.3},
            {"id": "2", "address": "2 Elf St", "suburb": "Nerang", "lat": "-27.9", "lng": 153.3},
            {"address": "no id", "lat": -27.9, "lng": 153.3},
            {"id": 4, "address": "4 Elf St", "lat": -28.0, "lng": 153.4},
            null
        ]"#,
    )?;

    let run = ItineraryStore::load(storage);
    let ids: Vec<_> = run.entries().iter().map(|e| e.id.as_str()).collect();
    assert_eq!(ids, vec!["1", "4"]);
    assert_eq!(run.entries()[1].suburb, None);
    Ok(())
}

#[test]
fn test_leaderboard_row_without_name_survives_reload() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let storage = Arc::new(FileStore::new(dir.path()));
    let mut run = ItineraryStore::load(storage.clone());

    let row: LeaderboardRow = serde_json::from_str(
        r#"{"id": 88, "address": "  ", "title": null, "votes": 12, "lat": -28.02, "lng": 153.31}"#,
    )?;
    assert_eq!(add_row_to_run(&mut run, &row)?, AddOutcome::Added);
    assert_eq!(
        add_row_to_run(&mut run, &row)?,
        AddOutcome::AlreadyPresent(DUPLICATE_WARNING)
    );

    let reloaded = ItineraryStore::load(storage);
    assert_eq!(reloaded.len(), 1);
    assert_eq!(reloaded.entries()[0].id, "88");
    assert_eq!(reloaded.entries()[0].address, UNNAMED_DISPLAY);
    Ok(())
}
