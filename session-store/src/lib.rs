//! Persistence for review sessions and upload jobs.
//!
//! Two tables are the system of record: `review_sessions` (one row per task,
//! carrying the packed graph state) and `upload_jobs` (one row per file
//! ingestion). Each store has two behaviorally equivalent backends:
//!
//! - **PostgREST** (Supabase-style) over `reqwest`, all writes idempotent
//!   upserts,
//! - **in-memory** maps, used as a fallback when no store is configured and
//!   as the mirror that keeps a run alive when persistence fails.
//!
//! Graph state is packed before it is written: plain JSON up to 5 MiB, then
//! transcript-pruned, then gzip+base64, then a minimal resume skeleton.

pub mod errors;
pub mod pack;
pub mod postgrest;
pub mod session;
pub mod upload;

pub use errors::{StoreError, StoreResult};
pub use pack::{pack_graph_state, unpack_graph_state};
pub use postgrest::PostgrestClient;
pub use session::{SessionMeta, SessionRow, SessionStatus, SessionStore};
pub use upload::{JobStatus, UploadJob, UploadJobStore};
