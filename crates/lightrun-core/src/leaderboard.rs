use crate::itinerary::{
    AddOutcome, ItineraryEntry, ItineraryStore, DUPLICATE_WARNING, UNNAMED_DISPLAY,
};
use crate::place::{deserialize_id, strip_house_number};
use crate::ranking::compare_by_votes;
use crate::storage::StorageError;
use log::info;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RunAddError {
    #[error("This display has no location to route to.")]
    MissingCoordinates,
    #[error(transparent)]
    Storage(#[from] StorageError),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeaderboardRow {
    #[serde(deserialize_with = "deserialize_id")]
    pub id: String,
    #[serde(default)]
    pub address: Option<String>,
    /// Older rows only carry a title
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub suburb: Option<String>,
    #[serde(default)]
    pub votes: u64,
    #[serde(default)]
    pub hide_number: bool,
    #[serde(default)]
    pub lat: Option<f64>,
    #[serde(default)]
    pub lng: Option<f64>,
}

impl LeaderboardRow {
    fn raw_address(&self) -> &str {
        self.address
            .as_deref()
            .filter(|a| !a.trim().is_empty())
            .or(self.title.as_deref())
            .unwrap_or("")
            .trim()
    }

    pub fn display_address(&self) -> String {
        let raw = self.raw_address();
        let cleaned = if self.hide_number {
            strip_house_number(raw)
        } else {
            raw.to_string()
        };
        if cleaned.is_empty() {
            UNNAMED_DISPLAY.to_string()
        } else {
            cleaned
        }
    }

    /// `None` when the row has no coordinates to route to.
    pub fn to_itinerary_entry(&self) -> Option<ItineraryEntry> {
        Some(ItineraryEntry {
            id: self.id.clone(),
            address: self.display_address(),
            suburb: self.suburb.clone(),
            lat: self.lat?,
            lng: self.lng?,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RankedRow {
    pub rank: usize,
    pub row: LeaderboardRow,
}

/// Sorts by the shared vote ordering and numbers rows 1..=N.
pub fn rank_rows(mut rows: Vec<LeaderboardRow>) -> Vec<RankedRow> {
    rows.retain(|r| !r.id.is_empty());
    rows.sort_by(|a, b| {
        compare_by_votes(
            a.votes,
            &a.display_address(),
            &a.id,
            b.votes,
            &b.display_address(),
            &b.id,
        )
    });
    rows.into_iter()
        .enumerate()
        .map(|(i, row)| RankedRow { rank: i + 1, row })
        .collect()
}

/// "  Upper   Coomera " and "upper coomera" share one key.
pub fn normalize_suburb(name: &str) -> String {
    name.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// `(key, label)` pairs, one per normalized suburb, labelled with the first
/// spelling seen and sorted by label.
pub fn suburb_options(rows: &[RankedRow]) -> Vec<(String, String)> {
    let mut seen: HashMap<String, String> = HashMap::new();
    for ranked in rows {
        let Some(suburb) = ranked.row.suburb.as_deref() else {
            continue;
        };
        let key = normalize_suburb(suburb);
        if key.is_empty() {
            continue;
        }
        seen.entry(key).or_insert_with(|| suburb.trim().to_string());
    }
    let mut options: Vec<(String, String)> = seen.into_iter().collect();
    options.sort_by(|a, b| a.1.cmp(&b.1).then_with(|| a.0.cmp(&b.0)));
    options
}

/// Rows in the given normalized suburb; `None` keeps everything.
pub fn filter_by_suburb<'a>(rows: &'a [RankedRow], key: Option<&str>) -> Vec<&'a RankedRow> {
    rows.iter()
        .filter(|r| match key {
            None => true,
            Some(key) => r
                .row
                .suburb
                .as_deref()
                .map(|s| normalize_suburb(s) == key)
                .unwrap_or(false),
        })
        .collect()
}

/// "Add to run" on a leaderboard row. Rows already in the run are reported
/// before anything else is checked.
pub fn add_row_to_run(run: &mut ItineraryStore, row: &LeaderboardRow) -> Result<AddOutcome, RunAddError> {
    if run.contains(&row.id) {
        return Ok(AddOutcome::AlreadyPresent(DUPLICATE_WARNING));
    }
    let entry = row.to_itinerary_entry().ok_or(RunAddError::MissingCoordinates)?;
    let outcome = run.add(entry)?;
    info!("Leaderboard row added to run — id={} votes={}", row.id, row.votes);
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;
    use std::sync::Arc;

    fn row(id: &str, address: &str, suburb: Option<&str>, votes: u64) -> LeaderboardRow {
        LeaderboardRow {
            id: id.to_string(),
            address: Some(address.to_string()),
            title: None,
            description: None,
            suburb: suburb.map(|s| s.to_string()),
            votes,
            hide_number: false,
            lat: Some(-28.0),
            lng: Some(153.4),
        }
    }

    #[test]
    fn test_rank_rows_contiguous() {
        let ranked = rank_rows(vec![
            row("1", "b street", None, 2),
            row("2", "A Street", None, 2),
            row("3", "c street", None, 8),
            row("", "ghost", None, 99),
        ]);
        let order: Vec<_> = ranked.iter().map(|r| (r.rank, r.row.id.as_str())).collect();
        assert_eq!(order, vec![(1, "3"), (2, "2"), (3, "1")]);
    }

    #[test]
    fn test_suburb_options_dedup() {
        let ranked = rank_rows(vec![
            row("1", "x", Some("Upper Coomera"), 3),
            row("2", "y", Some("upper  coomera "), 2),
            row("3", "z", Some("Ashmore"), 1),
            row("4", "w", None, 0),
        ]);
        let options = suburb_options(&ranked);
        assert_eq!(
            options,
            vec![
                ("ashmore".to_string(), "Ashmore".to_string()),
                ("upper coomera".to_string(), "Upper Coomera".to_string()),
            ]
        );
        assert_eq!(filter_by_suburb(&ranked, Some("upper coomera")).len(), 2);
        assert_eq!(filter_by_suburb(&ranked, None).len(), 4);
    }

    #[test]
    fn test_display_address_fallbacks() {
        let mut r = row("1", "", None, 0);
        r.title = Some("9 Bells Court".to_string());
        r.hide_number = true;
        assert_eq!(r.display_address(), "Bells Court");

        r.title = None;
        assert_eq!(r.display_address(), UNNAMED_DISPLAY);

        r.lat = None;
        assert!(r.to_itinerary_entry().is_none());
    }

    #[test]
    fn test_add_row_to_run_reports_duplicate_first() {
        let mut run = ItineraryStore::load(Arc::new(MemoryStore::new()));
        let mut r = row("5", "3 Tinsel Tce", Some("Ashmore"), 4);
        assert_eq!(add_row_to_run(&mut run, &r).unwrap(), AddOutcome::Added);

        // Same id without coordinates still gets the duplicate notice.
        r.lat = None;
        assert_eq!(
            add_row_to_run(&mut run, &r).unwrap(),
            AddOutcome::AlreadyPresent(DUPLICATE_WARNING)
        );
        assert_eq!(run.len(), 1);

        let stray = LeaderboardRow { lat: None, ..row("6", "x", None, 0) };
        assert!(matches!(
            add_row_to_run(&mut run, &stray),
            Err(RunAddError::MissingCoordinates)
        ));
        assert_eq!(run.len(), 1);
    }
}
