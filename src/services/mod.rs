pub mod analytics;
pub mod blog;
pub mod credentials;
pub mod engagement;
pub mod reset;

pub use analytics::AnalyticsService;
pub use blog::BlogService;
pub use credentials::CredentialService;
pub use engagement::EngagementLedger;
pub use reset::PasswordResetFlow;
