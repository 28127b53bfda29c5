use anyhow::Result;
use chrono::Utc;

use tis_state::{StateOrigin, StateStore, DATE_FORMAT};

use super::load_local_config;

/// `tis state show`: what the next sync would start from. Writes nothing.
pub fn show(config_paths: &[String]) -> Result<()> {
    let (_, cfg) = load_local_config(config_paths)?;
    let store = StateStore::from_config(&cfg);
    let state = store.load(Utc::now().date_naive())?;

    let origin = match state.origin {
        StateOrigin::Loaded => "loaded",
        StateOrigin::Fresh => "fresh",
        StateOrigin::Expired => "expired",
    };

    println!("state_file={}", store.known_path().display());
    println!("origin={}", origin);
    println!("expiration_date={}", state.expiration_date.format(DATE_FORMAT));
    println!("known_indicators={}", state.known.len());
    Ok(())
}
