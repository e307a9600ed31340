use dotenvy::dotenv;
use glob::glob;
use std::fs;
use tokio_postgres::NoTls;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let _ = dotenv();

    let database_url = match std::env::var("DATABASE_URL") {
        Ok(url) if !url.trim().is_empty() => url,
        _ => return Err("DATABASE_URL environment variable is required".into()),
    };

    let (mut client, connection) = tokio_postgres::connect(&database_url, NoTls).await?;

    tokio::spawn(async move {
        if let Err(e) = connection.await {
            eprintln!("connection error: {}", e);
        }
    });

    client.execute(
        "\
        CREATE TABLE IF NOT EXISTS schema_migrations (\
            version VARCHAR(100) PRIMARY KEY,\
            installed_on TIMESTAMPTZ NOT NULL DEFAULT NOW()\
        )",
        &[],
    ).await?;

    // V<n>__<name>.sql, applied in lexicographic order
    let mut migrations: Vec<String> = glob("migrations/V*.sql")?
        .filter_map(Result::ok)
        .map(|path| path.to_string_lossy().to_string())
        .collect();
    migrations.sort();

    if migrations.is_empty() {
        println!("No migration files found in migrations/");
        return Ok(());
    }

    for file in migrations {
        let name = std::path::Path::new(&file)
            .file_name()
            .and_then(|s| s.to_str())
            .unwrap_or(&file)
            .to_string();

        let applied = client
            .query_opt("SELECT version FROM schema_migrations WHERE version = $1", &[&name])
            .await?;

        if applied.is_some() {
            println!("Skipping already-applied migration: {}", name);
            continue;
        }

        println!("Applying migration: {}", name);
        let sql = fs::read_to_string(&file)?;

        let txn = client.transaction().await?;
        txn.batch_execute(&sql).await?;
        txn.execute("INSERT INTO schema_migrations (version) VALUES ($1)", &[&name]).await?;
        txn.commit().await?;

        println!("Applied: {}", name);
    }

    println!("Migrations complete");
    Ok(())
}
