use std::time::Duration;

use mongodb::{Client, Database, bson::doc};
use tokio::time::sleep;
use tracing::debug;

use super::{
    config::MongoConfig,
    error::{MongoDaoError, MongoResult},
};

const FIRST_BACKOFF: Duration = Duration::from_millis(250);
const MAX_BACKOFF: Duration = Duration::from_secs(5);

/// Build a client and wait until the server answers a ping.
pub async fn establish_connection(config: &MongoConfig) -> MongoResult<(Client, Database)> {
    let client = Client::with_options(config.options.clone())
        .map_err(|source| MongoDaoError::ClientConstruction { source })?;
    let database = client.database(&config.database_name);

    let mut attempts = 0;
    let mut backoff = FIRST_BACKOFF;
    while let Err(source) = database.run_command(doc! { "ping": 1 }).await {
        attempts += 1;
        if attempts >= config.connect_attempts.max(1) {
            return Err(MongoDaoError::InitialPing { attempts, source });
        }
        debug!(attempts, error = %source, "MongoDB not reachable yet");
        sleep(backoff).await;
        backoff = (backoff * 2).min(MAX_BACKOFF);
    }

    Ok((client, database))
}
