use error_stack::Report;

use super::types::HostResource;
use crate::domain::events::EventError;
use crate::domain::events::HostIdentity;

const MAX_ID_LEN: usize = 64;
const MAX_NAME_LEN: usize = 128;

impl HostResource {
    /// Structural checks of the host message itself.
    ///
    /// The upstream schema validates its messages before they are sent; these
    /// limits only reject what a hand-written event source could get wrong.
    ///
    /// # Errors
    ///
    /// Returns a description of the first offending field.
    pub fn check_fields(&self) -> Result<(), String> {
        check_id("resource_id", &self.resource_id)?;
        check_id("tenant_id", &self.tenant_id)?;
        if self.name.chars().count() > MAX_NAME_LEN {
            return Err(format!("name exceeds {MAX_NAME_LEN} characters"));
        }
        if self.name.chars().any(char::is_control) {
            return Err("name contains control characters".to_string());
        }
        Ok(())
    }

    /// Identity of the host; the tenant is the project.
    pub fn identity(&self) -> HostIdentity {
        HostIdentity::new(self.resource_id.clone(), self.tenant_id.clone())
    }
}

fn check_id(field: &str, value: &str) -> Result<(), String> {
    if value.len() > MAX_ID_LEN {
        return Err(format!("{field} exceeds {MAX_ID_LEN} bytes"));
    }
    if value
        .chars()
        .any(|c| c.is_whitespace() || c.is_control())
    {
        return Err(format!("{field} contains whitespace or control characters"));
    }
    Ok(())
}

/// Reject host messages that cannot be turned into a domain event.
///
/// # Errors
///
/// - [`EventError::InvalidHostResource`] if the host is missing, has an empty
///   resource or tenant id, or fails [`HostResource::check_fields`]
pub fn validate_host(host: Option<&HostResource>) -> Result<&HostResource, Report<EventError>> {
    let invalid = |message: String| Report::new(EventError::InvalidHostResource { message });

    let host = host.ok_or_else(|| invalid("host is missing".to_string()))?;
    if host.resource_id.is_empty() {
        return Err(invalid("resource_id is empty".to_string()));
    }
    if host.tenant_id.is_empty() {
        return Err(invalid("tenant_id is empty".to_string()));
    }
    host.check_fields().map_err(invalid)?;
    Ok(host)
}
