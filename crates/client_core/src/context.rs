use url::Url;

pub const PLATFORM_PARAM: &str = "platform";
pub const SHARED_GRID_PARAM: &str = "grid";

/// What the launch URL says about the session: the requested platform and
/// the shared-grid payload, if a shared grid is being opened.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LaunchContext {
    pub platform: Option<String>,
    pub shared_grid: Option<String>,
}

impl LaunchContext {
    pub fn from_url(raw: &str) -> Result<Self, url::ParseError> {
        let url = Url::parse(raw)?;
        let mut context = Self::default();
        for (key, value) in url.query_pairs() {
            match key.as_ref() {
                PLATFORM_PARAM if !value.is_empty() => context.platform = Some(value.into_owned()),
                SHARED_GRID_PARAM if !value.is_empty() => {
                    context.shared_grid = Some(value.into_owned())
                }
                _ => {}
            }
        }
        Ok(context)
    }

    pub fn is_shared(&self) -> bool {
        self.shared_grid.is_some()
    }
}

/// Picks the active platform: the URL value, then the stored one, then the
/// default. Values outside `valid` are skipped.
pub fn resolve_platform(
    from_url: Option<&str>,
    stored: Option<&str>,
    valid: &[String],
    default: &str,
) -> String {
    let is_valid = |candidate: &&str| valid.iter().any(|platform| platform == candidate);
    from_url
        .filter(is_valid)
        .or_else(|| stored.filter(is_valid))
        .unwrap_or(default)
        .to_string()
}
