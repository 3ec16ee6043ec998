use std::path::Path;

use crate::commands::common::{
    format_observation_lines, observation_to_list_item, open_database, ObservationListItem,
};
use crate::error::CliError;

pub async fn run_list(
    limit: usize,
    dirty_only: bool,
    as_json: bool,
    db_path: &Path,
) -> Result<(), CliError> {
    let db = open_database(db_path).await?;
    let observations = if dirty_only {
        let mut dirty = db.list_dirty_observations().await?;
        dirty.truncate(limit);
        dirty
    } else {
        db.list_observations(limit, 0).await?
    };
    db.close().await;

    if as_json {
        let json_items = observations
            .iter()
            .map(observation_to_list_item)
            .collect::<Vec<ObservationListItem>>();
        println!("{}", serde_json::to_string_pretty(&json_items)?);
    } else if observations.is_empty() {
        println!("No observations stored locally.");
    } else {
        for line in format_observation_lines(&observations) {
            println!("{line}");
        }
    }

    Ok(())
}
