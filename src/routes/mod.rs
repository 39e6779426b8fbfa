
/// Router Module Index
///
/// Organizes the portal's routes by the area the access policy assigns them to.
/// Protection is not attached per module: a single `access_control` layer wraps the
/// merged router and classifies each path, so these modules only decide where handlers
/// are mounted.

/// Auth pages, the provider callback and health: reachable while signed out.
pub mod public;

/// Pages for any signed-in user, whatever their role.
pub mod authenticated;

/// The `/admin` area, restricted to the `ADMIN` role.
pub mod admin;

/// The `/client` area, restricted to the `CLIENT` role.
pub mod client;
