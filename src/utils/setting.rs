// Database connectivity checks
use sqlx::{Connection, MySqlConnection, PgConnection};
use tracing::info;
use url::Url;

use crate::backup::db_dump::DatabaseEngine;
use crate::errors::Result;
use crate::utils::redact_url;

/// Opens and closes a connection to prove the database is reachable.
pub async fn check_db_connection(engine: DatabaseEngine, db_url: &str) -> Result<()> {
    match engine {
        DatabaseEngine::Postgres => {
            let conn = PgConnection::connect(db_url).await?;
            conn.close().await?;
        }
        DatabaseEngine::MySql => {
            let conn = MySqlConnection::connect(&mysql_connect_url(db_url)).await?;
            conn.close().await?;
        }
    }
    info!("Successfully connected to {}", redact_url(db_url));
    Ok(())
}

/// sqlx speaks the MySQL protocol to MariaDB; only the scheme differs.
fn mysql_connect_url(db_url: &str) -> String {
    match Url::parse(db_url) {
        Ok(mut parsed) if parsed.scheme() == "mariadb" => {
            let _ = parsed.set_scheme("mysql");
            parsed.to_string()
        }
        _ => db_url.to_string(),
    }
}
