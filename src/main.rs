use anyhow::{bail, Context, Result};
use cinelist::auth::{self, AuthSession, LoginOutcome};
use cinelist::browse::{Browser, DetailsOutcome};
use cinelist::catalog::{backdrop_url, MovieCatalog};
use cinelist::config::{Config, REQUIRED_ENV};
use cinelist::models::MovieResponse;
use cinelist::storage::{FileStorage, KeyValueStore};
use cinelist::store::AppStore;
use cinelist::tmdb::TmdbClient;
use cinelist::utils;
use dotenvy::dotenv;
use std::env;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const USAGE: &str = "usage: cinelist <popular [page] | search <query> [page] | details <id> | \
favorites | favorite <add|remove> <id> | login <email> <password> | logout | whoami>";

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();
}

fn check_env() -> Result<()> {
    for key in REQUIRED_ENV {
        if env::var(key).is_err() {
            bail!("Missing required environment variable: {}", key);
        }
    }
    info!("All required environment variables are set");
    Ok(())
}

fn parse_page(arg: Option<&String>) -> Result<u32> {
    match arg {
        None => Ok(1),
        Some(raw) => {
            let page: u32 = raw.parse().with_context(|| format!("invalid page '{raw}'"))?;
            if page == 0 {
                bail!("pages start at 1");
            }
            Ok(page)
        }
    }
}

fn parse_id(arg: Option<&String>) -> Result<i64> {
    let raw = arg.context(USAGE)?;
    raw.parse().with_context(|| format!("invalid movie id '{raw}'"))
}

fn print_page(response: &MovieResponse, favorites: &[i64]) {
    println!(
        "Page {}/{} ({} results)",
        response.page, response.total_pages, response.total_results
    );
    for movie in &response.results {
        let marker = if favorites.contains(&movie.id) { "*" } else { " " };
        println!(
            "{marker} {:>8}  {} ({}) {} {:.1}",
            movie.id,
            movie.title,
            utils::release_year(&movie.release_date),
            utils::numeric_to_emoji_rating(movie.vote_average),
            movie.vote_average
        );
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    match dotenv() {
        Ok(path) => info!("Loaded environment from {:?}", path),
        Err(e) => warn!("No .env file loaded ({}) - relying on environment", e),
    }
    init_tracing();

    let args: Vec<String> = env::args().skip(1).collect();
    let command = args.first().map(String::as_str).unwrap_or("popular");

    // Commands that never touch TMDB work without an api key.
    let offline = matches!(command, "favorites" | "favorite" | "login" | "logout" | "whoami");
    if !offline {
        check_env()?;
    }
    let config = Config::from_env();

    let file_storage = FileStorage::open(&config.storage_path)?;
    info!("Using storage file {}", file_storage.path().display());
    let storage: Arc<dyn KeyValueStore> = Arc::new(file_storage);
    let store = AppStore::new(storage.clone());

    match command {
        "favorites" => {
            let state = store.current_state();
            if state.favorite_movies.is_empty() {
                println!("No favorites yet");
            }
            for id in &state.favorite_movies {
                println!("{id}");
            }
        }
        "favorite" => {
            let id = parse_id(args.get(2))?;
            match args.get(1).map(String::as_str) {
                Some("add") => store.add_to_favorites(id),
                Some("remove") => store.remove_from_favorites(id),
                _ => bail!(USAGE),
            }
            println!("Favorites: {:?}", store.current_state().favorite_movies);
        }
        "login" => {
            let email = args.get(1).map(String::as_str).unwrap_or_default();
            let password = args.get(2).map(String::as_str).unwrap_or_default();
            if !email.is_empty() && !auth::validate_email(email) {
                bail!("Please enter a valid email address");
            }
            let session = AuthSession::new(storage.clone());
            match session.login(email, password).await {
                Ok(LoginOutcome::SignedIn(user)) => {
                    println!("Welcome, {}", utils::format_name(&user.name))
                }
                Ok(LoginOutcome::InvalidCredentials) => println!("Invalid email or password"),
                Err(e) => {
                    warn!("Login failed: {:#}", e);
                    println!("Login failed. Please try again.");
                }
            }
        }
        "logout" => AuthSession::new(storage.clone()).logout()?,
        "whoami" => match AuthSession::new(storage.clone()).current_user() {
            Some(user) => println!("{} <{}>", utils::format_name(&user.name), user.email),
            None => println!("Not signed in"),
        },
        "popular" | "search" | "details" => {
            let client = TmdbClient::from_config(&config)?;
            let catalog = Arc::new(MovieCatalog::new(Arc::new(client)));
            let browser = Browser::new(catalog, store.clone());
            match command {
                "popular" => {
                    let response = browser.load_popular(parse_page(args.get(1))?).await?;
                    print_page(&response, &store.current_state().favorite_movies);
                }
                "search" => {
                    let query = args.get(1).context(USAGE)?;
                    let page = parse_page(args.get(2))?;
                    let response = if page == 1 {
                        browser.run_search(query).await?
                    } else {
                        browser.store().set_search_query(query.as_str());
                        browser.change_page(page).await?
                    };
                    print_page(&response, &store.current_state().favorite_movies);
                }
                _ => match browser.open_details(parse_id(args.get(1))?).await {
                    DetailsOutcome::Shown(details) => {
                        let movie = &details.movie;
                        println!("{} ({})", movie.title, utils::release_year(&movie.release_date));
                        println!("{}", utils::truncate_text(&movie.overview, 280));
                        println!(
                            "Runtime {}  Budget {}  Revenue {}",
                            utils::format_runtime(details.runtime),
                            utils::format_currency(details.budget),
                            utils::format_currency(details.revenue)
                        );
                        let genres: Vec<&str> =
                            details.genres.iter().map(|g| g.name.as_str()).collect();
                        println!("Genres: {}", genres.join(", "));
                        println!("Poster: {}", browser.catalog().image_url(&movie.poster_path));
                        println!("Banner: {}", backdrop_url(&movie.backdrop_path));
                        for member in &details.cast {
                            println!("  cast  {} as {}", member.name, member.character);
                        }
                        for member in &details.crew {
                            println!("  crew  {} ({})", member.name, member.job);
                        }
                    }
                    DetailsOutcome::NavigateHome => {
                        bail!("Could not load movie details; try `cinelist popular`")
                    }
                },
            }
        }
        other => bail!("unknown command '{}'\n{}", other, USAGE),
    }
    Ok(())
}

