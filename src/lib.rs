// Library interface for the CLI and tests

pub mod config;
pub mod credentials;
pub mod firebase;
pub mod form;
pub mod identity;
pub mod model;
pub mod session;
pub mod store;
pub mod transcript;
pub mod upload;

pub use form::{FormError, LessonForm, LessonSubmission, VideoSource};
pub use identity::{AuthError, Identity, IdentityProvider, LocalIdentityProvider};
pub use model::{ContentRecord, LanguageSection};
pub use session::{single_email, SessionError, SessionGuard, SessionState};
pub use store::{BlobStore, DocumentStore, MediaFile, StoreError};
pub use transcript::{parse_transcript, TranscriptError, TranscriptRow, TranscriptTiming};
pub use upload::{LessonUploader, UploadError};
