/// Router Module Index
///
/// Groups the endpoints by who may call them. Grouping is for reading only: every
/// protected handler takes an `AuthUser` and runs its own role or ownership check, so a
/// route moved to the wrong file still cannot skip its guard.

/// Anonymous access: sign-up, sign-in, password reset and the public blog reads.
pub mod public;

/// Any valid session: profile, likes, comments and post ownership operations.
pub mod authenticated;

/// `author` role: the dashboard and post creation.
pub mod author;

/// `admin` role: user management.
pub mod admin;
