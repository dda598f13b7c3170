use crate::place::FeatureCollection;
use serde::{Deserialize, Serialize};

/// Which subset of the fetched displays the map shows.
///
/// A single button drives the cycle `All -> OpenNow -> Top10 -> All`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterMode {
    #[default]
    All,
    OpenNow,
    Top10,
}

/// Button appearance for a filter mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FilterStyle {
    pub label: &'static str,
    pub border: &'static str,
    pub background: &'static str,
    pub text: &'static str,
}

impl FilterMode {
    pub fn next(self) -> Self {
        match self {
            FilterMode::All => FilterMode::OpenNow,
            FilterMode::OpenNow => FilterMode::Top10,
            FilterMode::Top10 => FilterMode::All,
        }
    }

    /// Whether the fetch should ask for currently lit displays only.
    pub fn open_now(self) -> bool {
        matches!(self, FilterMode::OpenNow)
    }

    pub fn style(self) -> FilterStyle {
        match self {
            FilterMode::All => FilterStyle {
                label: "All displays",
                border: "1px solid #cccccc",
                background: "#ffffff",
                text: "#333333",
            },
            FilterMode::OpenNow => FilterStyle {
                label: "Lights on now",
                border: "1px solid #d6c8a5",
                background: "linear-gradient(135deg, #fff8e5, #ffe2b5)",
                text: "#5a3a12",
            },
            FilterMode::Top10 => FilterStyle {
                label: "Top 10 only",
                border: "1px solid #d6a5a5",
                background: "linear-gradient(135deg, #fff0f0, #ffd4d4)",
                text: "#5a1a1a",
            },
        }
    }

    pub fn label(self) -> &'static str {
        self.style().label
    }

    /// Local subsetting applied after the (cached) fetch.
    pub fn apply(self, full: &FeatureCollection) -> FeatureCollection {
        match self {
            FilterMode::Top10 => full.top_ten_subset(),
            FilterMode::All | FilterMode::OpenNow => full.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cycle_returns_home() {
        let mut mode = FilterMode::default();
        assert_eq!(mode, FilterMode::All);
        mode = mode.next();
        assert_eq!(mode, FilterMode::OpenNow);
        mode = mode.next();
        assert_eq!(mode, FilterMode::Top10);
        mode = mode.next();
        assert_eq!(mode, FilterMode::All);
    }

    #[test]
    fn test_style_depends_only_on_state() {
        for mode in [FilterMode::All, FilterMode::OpenNow, FilterMode::Top10] {
            assert_eq!(mode.style(), mode.style());
            assert_eq!(mode.next().next().next().style(), mode.style());
        }
        assert_eq!(FilterMode::OpenNow.label(), "Lights on now");
        assert_ne!(FilterMode::All.style(), FilterMode::Top10.style());
    }

    #[test]
    fn test_only_open_now_requests_lit_subset() {
        assert!(!FilterMode::All.open_now());
        assert!(FilterMode::OpenNow.open_now());
        // Top 10 is derived from the full seasonal set
        assert!(!FilterMode::Top10.open_now());
    }
}
