//! Seeds reference data and optionally an administrator.
//!
//! Usage: `setup-initial-data [--admin <username> <password>]`

use anyhow::{bail, Context};
use env_logger::Env;

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();
    sacm::app_config::init();

    let admin = parse_args(std::env::args().skip(1).collect())?;

    let url = sacm::db::database_url().context("DATABASE_URL or DB_NAME must be set")?;
    let db = sacm::db::connect(&url).await.context("connecting to the database")?;
    sacm::db::create_schema(&db).await.context("creating the schema")?;

    let report = sacm::seed::seed_initial_data(&db)
        .await
        .context("seeding reference data")?;
    println!(
        "Seeded {} departments, {} specializations, {} permission rows.",
        report.departments.len(),
        report.specializations.len(),
        report.roles.len()
    );

    if let Some((username, password)) = admin {
        match sacm::seed::create_admin(&db, &username, &password)
            .await
            .map_err(|e| anyhow::anyhow!("{}", e))?
        {
            Some(user) => println!("Created administrator '{}'.", user.username),
            None => println!("Administrator '{}' already exists.", username),
        }
    }

    Ok(())
}

fn parse_args(args: Vec<String>) -> anyhow::Result<Option<(String, String)>> {
    match args.as_slice() {
        [] => Ok(None),
        [flag, username, password] if flag == "--admin" => {
            Ok(Some((username.clone(), password.clone())))
        }
        _ => bail!("usage: setup-initial-data [--admin <username> <password>]"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_args() {
        assert_eq!(parse_args(vec![]).unwrap(), None);
        let args = vec!["--admin".to_owned(), "root".to_owned(), "secret123".to_owned()];
        assert_eq!(
            parse_args(args).unwrap(),
            Some(("root".to_owned(), "secret123".to_owned()))
        );
        assert!(parse_args(vec!["--admin".to_owned()]).is_err());
    }
}
