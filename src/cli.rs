// CineVault CLI binary

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};

use cinevault::constants::{DEFAULT_LIST_LIMIT, DEFAULT_PER_PAGE};
use cinevault::db::backup::{list_backups, spawn_backup_worker};
use cinevault::models::{Movie, Person, Series};
use cinevault::{BrowseFilter, Dal, Database, DbConfig};

#[derive(Parser)]
#[command(name = "cinevault")]
#[command(about = "CineVault - catalog database administration", long_about = None)]
#[command(version)]
struct Cli {
    /// Database file (overrides DB_PATH)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum Kind {
    Movies,
    Series,
    People,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the database, apply the schema and seed it if empty
    Init,

    /// Show connection, cache and pragma diagnostics
    Info,

    /// Snapshot the database into the backup directory
    Backup {
        /// List existing backups instead of creating one
        #[arg(long)]
        list: bool,
        /// Keep running and snapshot every N seconds (defaults to DB_BACKUP_INTERVAL_SECS)
        #[arg(long)]
        every: Option<u64>,
    },

    /// Browse movies, series or people
    List {
        #[arg(value_enum, default_value = "movies")]
        kind: Kind,
        /// Category slug
        #[arg(long)]
        category: Option<String>,
        /// Release (or first air) year
        #[arg(long)]
        year: Option<i64>,
        /// Cast role (people only)
        #[arg(long)]
        role: Option<String>,
        /// title, year, rating, views, downloads, created_at
        #[arg(long)]
        sort: Option<String>,
        #[arg(long)]
        asc: bool,
        #[arg(long, default_value = "1")]
        page: i64,
        #[arg(long, default_value_t = DEFAULT_PER_PAGE)]
        per_page: i64,
    },

    /// Search titles or people
    Search {
        term: String,
        #[arg(long, value_enum, default_value = "movies")]
        kind: Kind,
        #[arg(long, default_value_t = DEFAULT_LIST_LIMIT)]
        limit: i64,
    },

    /// Show full details for a movie, series or person
    Show {
        #[arg(value_enum)]
        kind: Kind,
        /// Slug or numeric id
        key: String,
    },

    /// Most viewed titles
    Trending {
        #[arg(long, value_enum, default_value = "movies")]
        kind: Kind,
        #[arg(long, default_value_t = DEFAULT_LIST_LIMIT)]
        limit: i64,
    },
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let mut config = DbConfig::from_env()?;
    if let Some(path) = cli.db.clone() {
        config = config.with_db_path(path);
    }

    match cli.command {
        Commands::Init => cmd_init(config),
        Commands::Info => cmd_info(config, cli.json),
        Commands::Backup { list, every } => cmd_backup(config, list, every),
        Commands::List {
            kind,
            category,
            year,
            role,
            sort,
            asc,
            page,
            per_page,
        } => {
            let filter = BrowseFilter {
                category,
                year,
                sort_by: sort,
                sort_order: Some(if asc { "asc" } else { "desc" }.to_string()),
                ..BrowseFilter::default()
            };
            cmd_list(&cinevault::open(config)?, kind, &filter, role.as_deref(), page, per_page, cli.json)
        }
        Commands::Search { term, kind, limit } => {
            cmd_search(&cinevault::open(config)?, &term, kind, limit, cli.json)
        }
        Commands::Show { kind, key } => cmd_show(&cinevault::open(config)?, kind, &key, cli.json),
        Commands::Trending { kind, limit } => {
            cmd_trending(&cinevault::open(config)?, kind, limit, cli.json)
        }
    }
}

fn cmd_init(config: DbConfig) -> Result<()> {
    let location = config.location();
    let dal = cinevault::open(config)?;
    let movies = dal.movies.base().count(&Default::default())?;
    let series = dal.series.base().count(&Default::default())?;

    println!("Database ready at {}", location);
    println!("  {} movies, {} series", movies, series);
    println!("  Backups go to {}", dal.db.config().backup_dir.display());
    Ok(())
}

fn cmd_info(config: DbConfig, json: bool) -> Result<()> {
    let db = Database::open(config)?;
    let info = db.info()?;

    if json {
        println!("{}", serde_json::to_string_pretty(&info)?);
        return Ok(());
    }

    println!("Path:         {}", info.path);
    println!("Environment:  {}", info.environment);
    println!("Connected:    {}", info.connected);
    println!(
        "Query cache:  {}/{} entries, {} hits, {} misses",
        info.cache_entries, info.cache_capacity, info.cache_hits, info.cache_misses
    );
    if let Some(p) = info.pragmas {
        println!("Journal:      {}", p.journal_mode);
        println!("Cache size:   {}", p.cache_size);
        println!("Synchronous:  {}", p.synchronous);
        println!("Foreign keys: {}", p.foreign_keys);
        println!("Temp store:   {}", p.temp_store);
        println!("Mmap size:    {}", format_size(p.mmap_size));
    }
    Ok(())
}

fn cmd_backup(config: DbConfig, list: bool, every: Option<u64>) -> Result<()> {
    if list {
        let backups = list_backups(&config.backup_dir)?;
        if backups.is_empty() {
            println!("No backups in {}", config.backup_dir.display());
            return Ok(());
        }
        for backup in backups {
            let modified: chrono::DateTime<chrono::Utc> = backup.modified.into();
            println!(
                "{:>10}  {}  {}",
                format_size(backup.size_bytes as i64),
                modified.format("%Y-%m-%d %H:%M:%S"),
                backup.path.display()
            );
        }
        return Ok(());
    }

    let interval = every.or(config.backup_interval_secs);
    let db = Arc::new(Database::open(config)?);
    let path = db.backup()?;
    println!("Backup written to {}", path.display());

    if let Some(secs) = interval {
        println!("Snapshotting every {}s. Press Ctrl-C to stop.", secs);
        let _worker = spawn_backup_worker(Arc::clone(&db), Duration::from_secs(secs))?;
        loop {
            std::thread::park();
        }
    }
    Ok(())
}

fn cmd_list(
    dal: &Dal,
    kind: Kind,
    filter: &BrowseFilter,
    role: Option<&str>,
    page: i64,
    per_page: i64,
    json: bool,
) -> Result<()> {
    match kind {
        Kind::Movies => {
            let result = dal.movies.browse(filter, page, per_page)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                print_movies(&result.data);
                print_page_footer(result.page, result.total_pages, result.total);
            }
        }
        Kind::Series => {
            let result = dal.series.browse(filter, page, per_page)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                print_series(&result.data);
                print_page_footer(result.page, result.total_pages, result.total);
            }
        }
        Kind::People => {
            let result = dal.people.browse(role, page, per_page)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                print_people(&result.data);
                print_page_footer(result.page, result.total_pages, result.total);
            }
        }
    }
    Ok(())
}

fn cmd_search(dal: &Dal, term: &str, kind: Kind, limit: i64, json: bool) -> Result<()> {
    match kind {
        Kind::Movies => {
            let found = dal.movies.search(term, 1, limit)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&found)?);
            } else {
                print_movies(&found.data);
            }
        }
        Kind::Series => {
            let found = dal.series.search(term, 1, limit)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&found)?);
            } else {
                print_series(&found.data);
            }
        }
        Kind::People => {
            let found = dal.people.search(term, limit)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&found)?);
            } else {
                print_people(&found);
            }
        }
    }
    Ok(())
}

fn cmd_show(dal: &Dal, kind: Kind, key: &str, json: bool) -> Result<()> {
    match kind {
        Kind::Movies => {
            let details = match key.parse::<i64>() {
                Ok(id) => dal.movies.get_details(id, None)?,
                Err(_) => dal.movies.get_details_by_slug(key, None)?,
            }
            .ok_or_else(|| anyhow::anyhow!("Movie {} not found", key))?;
            if json {
                println!("{}", serde_json::to_string_pretty(&details)?);
                return Ok(());
            }

            let m = &details.movie;
            println!("Movie #{} ({})", m.id, m.slug);
            println!();
            println!("Title:       {}", m.title);
            if let Some(year) = m.release_year {
                println!("Year:        {}", year);
            }
            if let Some(minutes) = m.duration_minutes {
                println!("Runtime:     {}", format_runtime(minutes));
            }
            if let Some(rating) = m.imdb_rating {
                println!("IMDb:        {:.1}", rating);
            }
            if let Some(ref quality) = details.quality {
                println!("Quality:     {}", quality.name);
            }
            let categories: Vec<_> = details.categories.iter().map(|c| c.name.as_str()).collect();
            if !categories.is_empty() {
                println!("Categories:  {}", categories.join(", "));
            }
            println!("Views:       {}  Downloads: {}", m.views_count, m.downloads_count);
            if details.rating.count > 0 {
                println!(
                    "User rating: {:.1} ({} votes)",
                    details.rating.average.unwrap_or_default(),
                    details.rating.count
                );
            }
            if !details.cast.is_empty() {
                println!();
                println!("Cast & crew:");
                for member in &details.cast {
                    match member.character_name {
                        Some(ref character) => println!("  {:<10} {} as {}", member.role, member.name, character),
                        None => println!("  {:<10} {}", member.role, member.name),
                    }
                }
            }
            if !details.links.is_empty() {
                println!();
                println!("Links:");
                for link in &details.links {
                    println!(
                        "  [{}] {} {} {}",
                        link.link_type,
                        link.server_name,
                        link.quality.as_deref().unwrap_or("-"),
                        link.url
                    );
                }
            }
        }
        Kind::Series => {
            let details = match key.parse::<i64>() {
                Ok(id) => dal.series.get_details(id, None)?,
                Err(_) => dal.series.get_details_by_slug(key, None)?,
            }
            .ok_or_else(|| anyhow::anyhow!("Series {} not found", key))?;
            if json {
                println!("{}", serde_json::to_string_pretty(&details)?);
                return Ok(());
            }

            let s = &details.series;
            println!("Series #{} ({})", s.id, s.slug);
            println!();
            println!("Title:       {}", s.title);
            println!("Status:      {}", s.status);
            if let Some(first) = s.first_air_year {
                let last = s.last_air_year.map(|y| y.to_string()).unwrap_or_default();
                println!("Aired:       {}-{}", first, last);
            }
            println!("Seasons:     {}  Episodes: {}", s.total_seasons, s.total_episodes);
            for season in &details.seasons {
                println!(
                    "  S{:02}  {:<20} {} episodes",
                    season.season_number,
                    season.title.as_deref().unwrap_or(""),
                    season.episode_count
                );
            }
        }
        Kind::People => {
            let person = match key.parse::<i64>() {
                Ok(id) => dal.people.find_by_id(id)?,
                Err(_) => dal.people.find_by_slug(key)?,
            }
            .ok_or_else(|| anyhow::anyhow!("Person {} not found", key))?;
            let details = dal
                .people
                .get_details(person.id)?
                .ok_or_else(|| anyhow::anyhow!("Person {} not found", key))?;
            if json {
                println!("{}", serde_json::to_string_pretty(&details)?);
                return Ok(());
            }

            println!("{} ({})", details.person.name, details.person.slug);
            if let Some(ref place) = details.person.birth_place {
                println!("Born:        {}", place);
            }
            for credit in details.movies.iter().chain(details.series.iter()) {
                let year = credit.year.map(|y| y.to_string()).unwrap_or_else(|| "-".into());
                println!("  {:>4}  {:<10} {}", year, credit.role, credit.title);
            }
        }
    }
    Ok(())
}

fn cmd_trending(dal: &Dal, kind: Kind, limit: i64, json: bool) -> Result<()> {
    match kind {
        Kind::Movies => {
            let movies = dal.movies.trending(limit)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&movies)?);
            } else if movies.is_empty() {
                println!("Nothing has been viewed yet.");
            } else {
                print_movies(&movies);
            }
        }
        Kind::Series => {
            let series = dal.series.trending(limit)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&series)?);
            } else if series.is_empty() {
                println!("Nothing has been viewed yet.");
            } else {
                print_series(&series);
            }
        }
        Kind::People => {
            let people = dal.people.popular(limit)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&people)?);
            } else {
                print_people(&people);
            }
        }
    }
    Ok(())
}

fn print_movies(movies: &[Movie]) {
    if movies.is_empty() {
        println!("No movies found.");
        return;
    }
    println!("{:>5}  {:>4}  {:>4}  {:>7}  {}", "ID", "Year", "IMDb", "Views", "Title");
    println!("{}", "-".repeat(60));
    for m in movies {
        println!(
            "{:>5}  {:>4}  {:>4}  {:>7}  {}",
            m.id,
            m.release_year.map(|y| y.to_string()).unwrap_or_else(|| "-".into()),
            m.imdb_rating.map(|r| format!("{:.1}", r)).unwrap_or_else(|| "-".into()),
            m.views_count,
            truncate(&m.title, 40)
        );
    }
}

fn print_series(series: &[Series]) {
    if series.is_empty() {
        println!("No series found.");
        return;
    }
    println!("{:>5}  {:>4}  {:>7}  {:>7}  {}", "ID", "Year", "Seasons", "Views", "Title");
    println!("{}", "-".repeat(60));
    for s in series {
        println!(
            "{:>5}  {:>4}  {:>7}  {:>7}  {}",
            s.id,
            s.first_air_year.map(|y| y.to_string()).unwrap_or_else(|| "-".into()),
            s.total_seasons,
            s.views_count,
            truncate(&s.title, 40)
        );
    }
}

fn print_people(people: &[Person]) {
    if people.is_empty() {
        println!("No people found.");
        return;
    }
    println!("{:>5}  {:>7}  {}", "ID", "Views", "Name");
    println!("{}", "-".repeat(50));
    for p in people {
        println!("{:>5}  {:>7}  {}", p.id, p.views_count, truncate(&p.name, 40));
    }
}

fn print_page_footer(page: i64, total_pages: i64, total: i64) {
    println!();
    println!("Page {} of {} ({} total)", page, total_pages.max(1), total);
}

fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() > max {
        let cut: String = text.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", cut)
    } else {
        text.to_string()
    }
}

fn format_runtime(minutes: i64) -> String {
    let hours = minutes / 60;
    let rest = minutes % 60;
    if hours > 0 {
        format!("{}h {:02}m", hours, rest)
    } else {
        format!("{}m", rest)
    }
}

fn format_size(bytes: i64) -> String {
    const KB: i64 = 1024;
    const MB: i64 = KB * 1024;
    const GB: i64 = MB * 1024;

    if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}
