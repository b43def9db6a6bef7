pub mod config;
pub mod consolidate;
pub mod io;
pub mod legiscan;
pub mod model;
pub mod names;
pub mod resolve;
pub mod row;
pub mod schema;
pub mod similarity;

pub use config::{Config, ConfigError, MatchConfig, RateLimitConfig, RetryConfig};
pub use consolidate::{CanonicalRegistry, Consolidator, UnitPeople, dedupe_rows};
pub use io::{BoxError, MentionSource, RecordSink};
pub use model::{
    CanonicalRecord, Chamber, Decision, EntityKind, MatchCandidate, MatchResult, MentionContext,
    MentionOrigin, RawMention, RemoteEntityRef, SessionUnit,
};
pub use names::{NameNormalizer, normalize_name};
pub use resolve::{EntityResolver, ResolverOptions, resolve, supersede};
pub use row::{Row, ToRow};
pub use schema::Table;
