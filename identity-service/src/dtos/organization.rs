use serde::Deserialize;
use validator::Validate;

use crate::models::OrganizationPatch;

#[derive(Debug, Deserialize, Validate)]
pub struct CreateOrganizationRequest {
    #[validate(length(min = 1, max = 255, message = "Name must be 1-255 characters"))]
    pub name: String,

    #[validate(length(min = 1, message = "Write endpoint must not be empty"))]
    pub write_endpoint: Option<String>,

    #[validate(length(min = 1, message = "Read endpoint must not be empty"))]
    pub read_endpoint: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateOrganizationRequest {
    #[validate(length(min = 1, max = 255, message = "Name must be 1-255 characters"))]
    pub display_name: Option<String>,

    pub sso_enabled: Option<bool>,

    #[validate(length(min = 1, message = "Write endpoint must not be empty"))]
    pub write_endpoint: Option<String>,

    #[validate(length(min = 1, message = "Read endpoint must not be empty"))]
    pub read_endpoint: Option<String>,
}

impl From<UpdateOrganizationRequest> for OrganizationPatch {
    fn from(req: UpdateOrganizationRequest) -> Self {
        Self {
            display_name: req.display_name,
            sso_enabled: req.sso_enabled,
            write_endpoint: req.write_endpoint,
            read_endpoint: req.read_endpoint,
        }
    }
}
