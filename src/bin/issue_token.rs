//! Seeds a user record in the data directory and prints a bearer token for it.
//!
//! usage: issue_token <user-id> [display-name]

use anyhow::{bail, Context};
use dotenv::dotenv;

use sketchroom::auth::jwt;
use sketchroom::config::Config;
use sketchroom::database::{EntityStore, JsonFileStore};
use sketchroom::models::User;

fn main() -> anyhow::Result<()> {
    dotenv().ok();
    env_logger::init_from_env(env_logger::Env::default().default_filter_or("info"));

    let mut args = std::env::args().skip(1);
    let Some(user_id) = args.next() else {
        bail!("usage: issue_token <user-id> [display-name]");
    };
    let name = args.next().unwrap_or_else(|| user_id.clone());

    let config = Config::from_env()?;
    let store = JsonFileStore::open(&config.data_dir)
        .with_context(|| format!("opening data dir {}", config.data_dir.display()))?;

    match store.get_user(&user_id)? {
        Some(existing) => log::info!("User {} already exists as {:?}", user_id, existing.name),
        None => {
            store.put_user(&User::new(user_id.clone(), name))?;
            log::info!("Created user {}", user_id);
        }
    }

    let auth = jwt::generate_token(&user_id, &config.auth.jwt_secret, config.auth.token_ttl_secs)?;
    println!("{}", auth.token);
    Ok(())
}
