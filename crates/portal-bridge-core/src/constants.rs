//! Global constants shared by the host shell and remote applications
//!
//! Role names, DOM attribute names and protocol defaults live here so the
//! host and every remote agree on them without a magic string in sight.

/// Display name published for an anonymous session
pub const GUEST_DISPLAY_NAME: &str = "Guest";

/// Role granting portal-wide administration
pub const ROLE_ADMIN: &str = "ROLE_ADMIN";

/// Role granting administration of every service
pub const ROLE_SUPER_ADMIN: &str = "ROLE_SUPER_ADMIN";

/// Role granting access to the seller console
pub const ROLE_SELLER: &str = "ROLE_SELLER";

/// Document root attribute naming the service currently in front
///
/// Remote stylesheets scope their selectors with `[data-service="..."]`.
pub const DATA_SERVICE_ATTR: &str = "data-service";

/// Attribute stamped on `<style>` nodes to record which remote injected them
pub const DATA_MF_APP_ATTR: &str = "data-mf-app";

/// Document root attribute carrying the resolved theme (`light` / `dark`)
pub const DATA_THEME_ATTR: &str = "data-theme";

/// Document root class attribute
pub const CLASS_ATTR: &str = "class";

/// Class toggled on the document root while the dark theme is active
pub const DARK_CLASS: &str = "dark";

/// Name of the single statically known export of a remote module
pub const MOUNT_EXPORT: &str = "mount";

/// Path a remote renders when the host gives it no initial path
pub const DEFAULT_INITIAL_PATH: &str = "/";
