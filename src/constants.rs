// CineVault Constants
// Defaults for the data access layer. Environment variables override most of these (see config.rs).

// Paths
pub const APP_DATA_DIR: &str = ".cinevault";
pub const DB_FILENAME: &str = "cinevault.db";
pub const BACKUP_FOLDER: &str = "backups";
pub const BACKUP_PREFIX: &str = "backup-";
pub const BACKUP_DEFAULT_EXTENSION: &str = "db";
pub const BACKUP_TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H-%M-%S-%3fZ";

// Pragmas
pub const DEFAULT_CACHE_SIZE: i64 = -64_000; // negative = KiB, so ~64MB
pub const DEFAULT_MMAP_SIZE: i64 = 268_435_456; // 256MB
pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

// Query cache
pub const DEFAULT_QUERY_CACHE_SIZE: usize = 100;
pub const DEFAULT_SLOW_QUERY_MS: u64 = 100;

// Backups
pub const DEFAULT_BACKUP_RETENTION: usize = 7;

// Bootstrap
// Presence of this table decides whether the schema script runs,
// and its row count decides whether the seed script runs.
pub const PRIMARY_CONTENT_TABLE: &str = "movies";

// Timestamps are stored in the same shape as SQLite's datetime('now')
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

// Pagination
pub const DEFAULT_PER_PAGE: i64 = 20;

// Listings
pub const DEFAULT_LIST_LIMIT: i64 = 10;

// Ratings
pub const RATING_MIN: i64 = 1;
pub const RATING_MAX: i64 = 10;

// Polymorphic content types (ratings, favorites)
pub const CONTENT_MOVIE: &str = "movie";
pub const CONTENT_SERIES: &str = "series";

// Link types
pub const LINK_WATCH: &str = "watch";
pub const LINK_DOWNLOAD: &str = "download";
pub const LINK_TYPES: [&str; 2] = [LINK_WATCH, LINK_DOWNLOAD];

// Credit roles on movie_cast / series_cast
pub const CAST_ROLES: [&str; 5] = ["actor", "director", "writer", "producer", "composer"];

// Fallback slug when a title has no usable characters
pub const SLUG_FALLBACK: &str = "item";

// User roles
pub const ROLE_USER: &str = "user";
pub const ROLE_MODERATOR: &str = "moderator";
pub const ROLE_ADMIN: &str = "admin";
pub const USER_ROLES: [&str; 3] = [ROLE_USER, ROLE_MODERATOR, ROLE_ADMIN];
