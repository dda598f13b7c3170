// SPDX-License-Identifier: MIT
// Copyright (c) 2026 LightRun contributors

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use lightrun_core::controller::MapController;
use lightrun_core::filter::FilterMode;
use lightrun_core::geocode::{Geocoder, MapboxGeocoder};
use lightrun_core::itinerary::{AddOutcome, ItineraryEntry, ItineraryStore};
use lightrun_core::leaderboard::{
    add_row_to_run, filter_by_suburb, normalize_suburb, rank_rows, suburb_options,
};
use lightrun_core::query::PlaceLookup;
use lightrun_core::remote::{PlacesApi, RestVoteStore};
use lightrun_core::route::build_route_url_with_base;
use lightrun_core::session::{StaticSession, Visitor};
use lightrun_core::storage::FileStore;
use lightrun_core::submit::{Submission, SubmitFlow};
use lightrun_core::vote::{vote_count_label, UnconfiguredVoteStore, VoteStore, VoteSync};
use lightrun_core::{get_config_root, Config, MemoryFeatureCache, PlaceLoader, Season};
use log::{debug, LevelFilter};
use simplelog::{ColorChoice, TermLogger, TerminalMode};
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to config.json
    #[arg(short, long, env = "LIGHTRUN_CONFIG")]
    config: Option<PathBuf>,

    /// Base URL of the places API (overrides config)
    #[arg(long, env = "LIGHTRUN_API_URL")]
    api_url: Option<String>,

    /// Visitor id used for voting
    #[arg(long, env = "LIGHTRUN_VISITOR")]
    visitor: Option<String>,

    /// Access token of the signed-in visitor
    #[arg(long, env = "LIGHTRUN_TOKEN")]
    token: Option<String>,

    /// Log debug output to stderr
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum FilterArg {
    All,
    OpenNow,
    Top10,
}

impl From<FilterArg> for FilterMode {
    fn from(arg: FilterArg) -> Self {
        match arg {
            FilterArg::All => FilterMode::All,
            FilterArg::OpenNow => FilterMode::OpenNow,
            FilterArg::Top10 => FilterMode::Top10,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Show the saved run
    List,
    /// Add a display to the run
    Add {
        id: String,
        address: String,
        #[arg(long)]
        suburb: Option<String>,
        #[arg(long, allow_hyphen_values = true)]
        lat: f64,
        #[arg(long, allow_hyphen_values = true)]
        lng: f64,
    },
    /// Remove a display from the run by id
    Remove { id: String },
    /// Empty the run
    Clear,
    /// Print the directions link for the run
    Route {
        /// Open the link in the default browser
        #[arg(long)]
        open: bool,
    },
    /// List displays on the map
    Places {
        #[arg(long, value_enum, default_value = "all")]
        filter: FilterArg,
        /// christmas or halloween; defaults to the current month's season
        #[arg(long)]
        season: Option<Season>,
    },
    /// Replace the run with the current top ten
    Top10Run {
        #[arg(long)]
        season: Option<Season>,
    },
    /// Toggle the visitor's vote on a display
    Vote { place_id: String },
    /// Look up coordinates for an address
    Geocode { query: String },
    /// Show the all-time leaderboard
    Leaderboard {
        /// Only rows in this suburb
        #[arg(long)]
        suburb: Option<String>,
        /// Add the leaderboard row with this id to the run
        #[arg(long, value_name = "ID")]
        add: Option<String>,
    },
    /// Show one approved display
    Place { id: String },
    /// Submit a new display for moderation
    Submit {
        address: String,
        #[arg(long)]
        name: String,
        #[arg(long)]
        email: String,
        #[arg(long)]
        phone: Option<String>,
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        suburb: Option<String>,
        /// Looked up from the address when omitted
        #[arg(long, allow_hyphen_values = true, requires = "lng")]
        lat: Option<f64>,
        #[arg(long, allow_hyphen_values = true, requires = "lat")]
        lng: Option<f64>,
        /// Lights on, HH:MM
        #[arg(long)]
        start: Option<String>,
        /// Lights off, HH:MM
        #[arg(long)]
        end: Option<String>,
        /// Hide the house number publicly
        #[arg(long)]
        hide_number: bool,
        /// Submitter lives at the address
        #[arg(long)]
        owner: bool,
    },
}

fn init_logging(verbose: bool) {
    let level = if verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Warn
    };
    let _ = TermLogger::init(
        level,
        simplelog::Config::default(),
        TerminalMode::Stderr,
        ColorChoice::Auto,
    );
}

fn print_run(entries: &[ItineraryEntry]) {
    if entries.is_empty() {
        println!("Your run is empty.");
        return;
    }
    for (i, entry) in entries.iter().enumerate() {
        match &entry.suburb {
            Some(suburb) => println!("{:>2}. {} ({}) [{}]", i + 1, entry.address, suburb, entry.id),
            None => println!("{:>2}. {} [{}]", i + 1, entry.address, entry.id),
        }
    }
}

fn session_for(cli: &Cli) -> StaticSession {
    match &cli.visitor {
        Some(id) => {
            let mut visitor = Visitor::new(id.clone());
            if let Some(token) = &cli.token {
                visitor = visitor.with_token(token.clone());
            }
            StaticSession::signed_in(visitor)
        }
        None => StaticSession::anonymous(),
    }
}

fn vote_store(config: &Config) -> Result<RestVoteStore> {
    let (Some(url), Some(key)) = (&config.supabase_url, &config.supabase_anon_key) else {
        bail!("Voting needs supabase_url and supabase_anon_key in the config file.");
    };
    Ok(RestVoteStore::new(url, key.clone())?)
}

fn vote_backend(config: &Config) -> Arc<dyn VoteStore> {
    match vote_store(config) {
        Ok(store) => Arc::new(store),
        Err(e) => {
            debug!("Vote store unavailable — error={}", e);
            Arc::new(UnconfiguredVoteStore)
        }
    }
}

/// The run lives next to the config file in use.
fn run_dir(config_path: &Path) -> PathBuf {
    match config_path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
        Some(_) => PathBuf::from("."),
        None => get_config_root(),
    }
}

fn route_link(config: &Config, run: &ItineraryStore) -> Option<String> {
    build_route_url_with_base(&config.directions_base_url, run.entries())
}

fn build_controller(cli: &Cli, config: &Config, season: Season, run: ItineraryStore) -> Result<MapController> {
    let api = PlacesApi::new(&config.api_base_url)?;
    let loader = Arc::new(PlaceLoader::new(Arc::new(api), Arc::new(MemoryFeatureCache::new())));
    let votes = Arc::new(VoteSync::new(vote_backend(config), Arc::new(session_for(cli))));
    Ok(MapController::new(season, loader, votes, run)
        .with_region_label(config.region_label.clone())
        .with_directions_base(config.directions_base_url.clone()))
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config_path = cli.config.clone().unwrap_or_else(Config::default_path);
    let mut config = Config::load(&config_path)?;
    if let Some(url) = &cli.api_url {
        config.api_base_url = url.clone();
    }
    debug!("Config loaded — path={}", config_path.display());

    let storage = Arc::new(FileStore::new(run_dir(&config_path)));
    let mut run = ItineraryStore::load(storage).with_pulse_duration(config.pulse_duration());

    match &cli.command {
        Commands::List => print_run(run.entries()),
        Commands::Add {
            id,
            address,
            suburb,
            lat,
            lng,
        } => {
            let entry = ItineraryEntry {
                id: id.clone(),
                address: address.clone(),
                suburb: suburb.clone(),
                lat: *lat,
                lng: *lng,
            };
            match run.add(entry)? {
                AddOutcome::Added => println!("Added {} to your run.", address),
                AddOutcome::AlreadyPresent(warning) => println!("{}", warning),
            }
        }
        Commands::Remove { id } => {
            if run.remove(id)? {
                println!("Removed {} from your run.", id);
            } else {
                println!("No display with id '{}' in your run.", id);
            }
        }
        Commands::Clear => {
            run.clear()?;
            println!("Run cleared.");
        }
        Commands::Route { open: launch } => {
            let Some(url) = route_link(&config, &run) else {
                println!("Add at least one display to build a route.");
                return Ok(());
            };
            println!("{}", url);
            if *launch {
                open::that(&url).context("Failed to open browser")?;
            }
        }
        Commands::Places { filter, season } => {
            let season = season.unwrap_or_else(Season::current);
            let mut controller = build_controller(&cli, &config, season, run)?;
            let mode = FilterMode::from(*filter);
            while controller.filter() != mode {
                controller.cycle_filter();
            }
            controller.refresh().await?;

            println!("{} ({})", controller.filter_style().label, season);
            for feature in &controller.rendered().features {
                let badge = feature
                    .rank_badge(&config.region_label)
                    .map(|b| format!(" {}", b))
                    .unwrap_or_default();
                println!(
                    "[{}] {} ({}){}",
                    feature.id(),
                    feature.display_title(),
                    vote_count_label(feature.properties.votes),
                    badge
                );
            }
        }
        Commands::Top10Run { season } => {
            let season = season.unwrap_or_else(Season::current);
            let mut controller = build_controller(&cli, &config, season, run)?;
            controller.refresh().await?;
            let count = controller.load_top_ten_route()?;
            println!("Loaded {} displays into your run.", count);
            print_run(&controller.run_entries());
            if let Some(url) = controller.route_url() {
                println!("{}", url);
            }
        }
        Commands::Vote { place_id } => {
            let sync = VoteSync::new(Arc::new(vote_store(&config)?), Arc::new(session_for(&cli)));
            let outcome = sync.toggle(place_id).await?;
            let verb = if outcome.voted { "Voted for" } else { "Removed vote from" };
            match outcome.votes {
                Some(votes) => println!("{} {}: {}", verb, place_id, vote_count_label(votes)),
                None => println!("{} {}", verb, place_id),
            }
        }
        Commands::Geocode { query } => {
            let geocoder = MapboxGeocoder::new(config.mapbox_token.clone(), config.geocode_country.clone());
            let found = geocoder.lookup(query).await?;
            println!("{}", found.place_name);
            println!("  address: {}", found.canonical_address);
            if let Some(suburb) = &found.suburb {
                println!("  suburb:  {}", suburb);
            }
            println!("  lat/lng: {},{}", found.lat, found.lng);
        }
        Commands::Leaderboard { suburb, add } => {
            let api = PlacesApi::new(&config.api_base_url)?;
            let ranked = rank_rows(api.leaderboard().await?);

            if let Some(id) = add {
                let Some(ranked_row) = ranked.iter().find(|r| r.row.id == *id) else {
                    bail!("No display with id '{}' on the leaderboard.", id);
                };
                match add_row_to_run(&mut run, &ranked_row.row)? {
                    AddOutcome::Added => {
                        println!("Added {} to your run.", ranked_row.row.display_address())
                    }
                    AddOutcome::AlreadyPresent(warning) => println!("{}", warning),
                }
                return Ok(());
            }

            let key = suburb.as_deref().map(normalize_suburb);

            if let Some(key) = &key {
                if !suburb_options(&ranked).iter().any(|(k, _)| k == key) {
                    println!("No displays in that suburb yet.");
                    return Ok(());
                }
            }
            for row in filter_by_suburb(&ranked, key.as_deref()) {
                println!(
                    "{:>3}. {} ({})",
                    row.rank,
                    row.row.display_address(),
                    vote_count_label(row.row.votes)
                );
            }
        }
        Commands::Place { id } => {
            let api = PlacesApi::new(&config.api_base_url)?;
            let place = api.place(id).await?;
            println!("{} ({})", place.display_address(), vote_count_label(place.votes));
            if let Some(suburb) = &place.suburb {
                println!("  suburb:  {}", suburb);
            }
            if let Some(hours) = place.hours_label() {
                println!("  hours:   {}", hours);
            }
            if let Some(description) = &place.description {
                println!("  {}", description);
            }
        }
        Commands::Submit {
            address,
            name,
            email,
            phone,
            description,
            suburb,
            lat,
            lng,
            start,
            end,
            hide_number,
            owner,
        } => {
            let api = PlacesApi::new(&config.api_base_url)?;
            let geocoder = MapboxGeocoder::new(config.mapbox_token.clone(), config.geocode_country.clone());
            let flow = SubmitFlow::new(Arc::new(api), Arc::new(geocoder), Season::current());
            let receipt = flow
                .submit(Submission {
                    address: address.clone(),
                    description: description.clone(),
                    lat: *lat,
                    lng: *lng,
                    suburb: suburb.clone(),
                    open_start: start.clone(),
                    open_end: end.clone(),
                    hide_number: *hide_number,
                    is_owner: *owner,
                    contact_name: name.clone(),
                    contact_email: email.clone(),
                    contact_phone: phone.clone(),
                })
                .await?;
            println!(
                "Thanks! Display {} was submitted and will appear once approved.",
                receipt.place_id
            );
        }
    }

    Ok(())
}
