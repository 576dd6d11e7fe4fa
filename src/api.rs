//! Typed endpoints of the dashboard backend.
//!
//! Every call goes through [`ApiClient::send`], so all of them share the token
//! refresh pipeline. Reports are validated here, before anything downstream
//! sees them.

use std::sync::OnceLock;

use log::info;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::client::{ApiClient, ApiRequest, ClientError};
use crate::model::{Report, ReportError};
use crate::session::TokenPair;

pub const REGISTER_ENDPOINT: &str = "/users/register/";
pub const LOGIN_ENDPOINT: &str = "/users/token/";
pub const CURRENT_USER_ENDPOINT: &str = "/users/me/";
pub const USER_LIST_ENDPOINT: &str = "/users/user-list/";
pub const REPORTS_ENDPOINT: &str = "/reports/my-files/";
pub const DELETE_REPORTS_ENDPOINT: &str = "/reports/delete/";
pub const VIDEO_URL_ENDPOINT: &str = "/reports/video-url/";
pub const UPLOAD_ENDPOINT: &str = "/reports/upload";
pub const CHECKOUT_ENDPOINT: &str = "/users/create-checkout-session/";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Athlete,
}

/// A dashboard account.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: u64,
    pub email: String,
    pub username: String,
    pub role: Role,
    #[serde(default)]
    pub last_login: Option<String>,
    #[serde(default)]
    pub date_joined: Option<String>,
}

/// Sign-up payload. The plan fields default to a free monthly subscription.
#[derive(Clone, Debug, Serialize)]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub password: String,
    pub password2: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub plan: String,
    pub interval: String,
}

impl RegisterRequest {
    pub fn new(
        username: impl Into<String>,
        email: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        let password = password.into();
        Self {
            username: username.into(),
            email: email.into(),
            password2: password.clone(),
            password,
            kind: "subscription".to_string(),
            plan: "free".to_string(),
            interval: "month".to_string(),
        }
    }

    /// Sets the subscription plan and returns the updated request.
    pub fn with_plan(mut self, plan: impl Into<String>, interval: impl Into<String>) -> Self {
        self.plan = plan.into();
        self.interval = interval.into();
        self
    }
}

/// Token and checkout data returned by registration and login.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct AuthResponse {
    #[serde(default)]
    pub access: Option<String>,
    #[serde(default)]
    pub refresh: Option<String>,
    #[serde(default)]
    pub checkout_url: Option<String>,
}

impl AuthResponse {
    /// The credential pair, when both tokens were issued.
    pub fn token_pair(&self) -> Option<TokenPair> {
        match (&self.access, &self.refresh) {
            (Some(access), Some(refresh)) => Some(TokenPair::new(access, refresh)),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BillingInterval {
    Month,
    Year,
}

/// Body of a checkout session request.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CheckoutRequest {
    Subscription {
        plan: String,
        interval: BillingInterval,
    },
    OneTime {
        plan: String,
    },
}

impl CheckoutRequest {
    pub fn subscription(plan: impl Into<String>, interval: BillingInterval) -> Self {
        Self::Subscription {
            plan: plan.into(),
            interval,
        }
    }

    /// A single PDF report purchase.
    pub fn pdf_report() -> Self {
        Self::OneTime {
            plan: "pdf_report".to_string(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct CheckoutResponse {
    #[serde(default)]
    action: Option<String>,
    #[serde(default)]
    checkout_url: Option<String>,
    #[serde(default)]
    billing_portal_url: Option<String>,
}

/// Where the payment provider wants the user to go next.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CheckoutSession {
    /// Pay for a new plan or purchase.
    NewSubscription { checkout_url: String },
    /// The account already has a subscription; manage it in the billing portal.
    ManageExisting { billing_portal_url: String },
}

impl CheckoutSession {
    pub fn url(&self) -> &str {
        match self {
            CheckoutSession::NewSubscription { checkout_url } => checkout_url,
            CheckoutSession::ManageExisting { billing_portal_url } => billing_portal_url,
        }
    }
}

impl CheckoutResponse {
    fn into_session(self) -> Result<CheckoutSession, ClientError> {
        let CheckoutResponse {
            action,
            checkout_url,
            billing_portal_url,
        } = self;
        match (action.as_deref(), checkout_url, billing_portal_url) {
            (Some("new_subscription"), Some(checkout_url), _) => {
                Ok(CheckoutSession::NewSubscription { checkout_url })
            }
            (Some("manage_existing"), _, Some(billing_portal_url)) => {
                Ok(CheckoutSession::ManageExisting { billing_portal_url })
            }
            _ => Err(ClientError::InvalidRequest(format!(
                "checkout response carried no usable URL (action {action:?})"
            ))),
        }
    }
}

/// Where a match video is hosted.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VideoHost {
    YouTube,
    GoogleDrive,
}

const YOUTUBE_PATTERN: &str = r"^(https?://)?(www\.)?(youtube\.com/watch\?v=|youtu\.be/)[\w-]+";
const DRIVE_PATTERN: &str = r"^https://drive\.google\.com/(file/d/|open\?id=)[\w-]+";

fn matches(cell: &'static OnceLock<Option<Regex>>, pattern: &str, url: &str) -> bool {
    cell.get_or_init(|| Regex::new(pattern).ok())
        .as_ref()
        .is_some_and(|re| re.is_match(url))
}

/// Classifies `url` as a supported video link.
pub fn video_host(url: &str) -> Option<VideoHost> {
    static YOUTUBE: OnceLock<Option<Regex>> = OnceLock::new();
    static DRIVE: OnceLock<Option<Regex>> = OnceLock::new();

    let url = url.trim();
    if matches(&YOUTUBE, YOUTUBE_PATTERN, url) {
        Some(VideoHost::YouTube)
    } else if matches(&DRIVE, DRIVE_PATTERN, url) {
        Some(VideoHost::GoogleDrive)
    } else {
        None
    }
}

impl ApiClient {
    /// Creates an account. Tokens in the response become the current session.
    pub async fn register(&self, request: &RegisterRequest) -> Result<AuthResponse, ClientError> {
        if request.password != request.password2 {
            return Err(ClientError::InvalidRequest(
                "passwords do not match".to_string(),
            ));
        }
        let body = serde_json::to_value(request)?;
        let response: AuthResponse = self
            .send_json(ApiRequest::post(REGISTER_ENDPOINT).with_json(body))
            .await?;
        if let Some(pair) = response.token_pair() {
            self.set_tokens(&pair)?;
            info!("Registered {} and stored session", request.username);
        }
        Ok(response)
    }

    /// Exchanges credentials for a token pair and stores it.
    pub async fn login(&self, username: &str, password: &str) -> Result<TokenPair, ClientError> {
        let response: AuthResponse = self
            .send_json(
                ApiRequest::post(LOGIN_ENDPOINT)
                    .with_json(json!({ "username": username, "password": password })),
            )
            .await?;
        let pair = response.token_pair().ok_or_else(|| {
            ClientError::InvalidRequest("login response did not contain a token pair".to_string())
        })?;
        self.set_tokens(&pair)?;
        info!("Logged in as {}", username);
        Ok(pair)
    }

    pub async fn current_user(&self) -> Result<User, ClientError> {
        self.send_json(ApiRequest::get(CURRENT_USER_ENDPOINT)).await
    }

    /// Lists accounts with the athlete role.
    pub async fn athletes(&self) -> Result<Vec<User>, ClientError> {
        let users: Vec<User> = self.send_json(ApiRequest::get(USER_LIST_ENDPOINT)).await?;
        Ok(users
            .into_iter()
            .filter(|user| user.role == Role::Athlete)
            .collect())
    }

    /// Lists the caller's reports, validating every record.
    pub async fn list_reports(&self) -> Result<Vec<Report>, ClientError> {
        let reports: Vec<Report> = self.send_json(ApiRequest::get(REPORTS_ENDPOINT)).await?;
        for report in &reports {
            report.validate()?;
        }
        Ok(reports)
    }

    pub async fn fetch_report(&self, id: u64) -> Result<Report, ClientError> {
        self.list_reports()
            .await?
            .into_iter()
            .find(|report| report.id == id)
            .ok_or(ClientError::Report(ReportError::NotFound(id)))
    }

    /// Deletes the reports whose source files are named by `keys`.
    pub async fn delete_reports(&self, keys: &[String]) -> Result<(), ClientError> {
        if keys.is_empty() {
            return Err(ClientError::InvalidRequest(
                "no reports selected for deletion".to_string(),
            ));
        }
        self.send(ApiRequest::delete(DELETE_REPORTS_ENDPOINT).with_json(json!({ "keys": keys })))
            .await?;
        info!("Deleted {} report(s)", keys.len());
        Ok(())
    }

    /// Submits a YouTube or Google Drive link for analysis.
    pub async fn submit_video_url(&self, url: &str) -> Result<VideoHost, ClientError> {
        let host = video_host(url).ok_or_else(|| {
            ClientError::InvalidRequest(format!(
                "{url:?} is not a YouTube or Google Drive link"
            ))
        })?;
        self.send(
            ApiRequest::post(VIDEO_URL_ENDPOINT).with_json(json!({ "video_url": url.trim() })),
        )
        .await?;
        Ok(host)
    }

    /// Starts a payment session for a plan or a one-off report purchase.
    pub async fn create_checkout_session(
        &self,
        request: &CheckoutRequest,
    ) -> Result<CheckoutSession, ClientError> {
        let body = serde_json::to_value(request)?;
        let response: CheckoutResponse = self
            .send_json(ApiRequest::post(CHECKOUT_ENDPOINT).with_json(body))
            .await?;
        response.into_session()
    }

    /// Uploads a match data file for analysis.
    pub async fn upload_report_file(
        &self,
        filename: &str,
        bytes: Vec<u8>,
    ) -> Result<(), ClientError> {
        if bytes.is_empty() {
            return Err(ClientError::InvalidRequest(format!("{filename} is empty")));
        }
        let size = bytes.len();
        self.send(ApiRequest::post(UPLOAD_ENDPOINT).with_file("file", filename, bytes))
            .await?;
        info!("Uploaded {} ({} bytes)", filename, size);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn video_links_are_classified() {
        assert_eq!(
            video_host("https://www.youtube.com/watch?v=dQw4w9WgXcQ"),
            Some(VideoHost::YouTube)
        );
        assert_eq!(video_host("youtu.be/abc123"), Some(VideoHost::YouTube));
        assert_eq!(
            video_host("https://drive.google.com/file/d/1AbC_d-9/view"),
            Some(VideoHost::GoogleDrive)
        );
        assert_eq!(
            video_host("https://drive.google.com/open?id=1AbC"),
            Some(VideoHost::GoogleDrive)
        );
        assert_eq!(video_host("https://vimeo.com/12345"), None);
        assert_eq!(video_host("http://drive.google.com/file/d/1AbC"), None);
    }

    #[test]
    fn register_defaults_to_free_monthly_plan() {
        let request = RegisterRequest::new("ana", "ana@example.com", "pa55word");
        let body = serde_json::to_value(&request).unwrap();
        assert_eq!(body["type"], "subscription");
        assert_eq!(body["plan"], "free");
        assert_eq!(body["interval"], "month");
        assert_eq!(body["password2"], "pa55word");
    }

    #[test]
    fn auth_response_requires_both_tokens() {
        let partial: AuthResponse =
            serde_json::from_str(r#"{"checkout_url":"https://pay.example/1"}"#).unwrap();
        assert!(partial.token_pair().is_none());
        let full: AuthResponse = serde_json::from_str(r#"{"access":"A1","refresh":"R1"}"#).unwrap();
        assert_eq!(full.token_pair(), Some(TokenPair::new("A1", "R1")));
    }

    #[test]
    fn user_roles_deserialize_lowercase() {
        let user: User = serde_json::from_str(
            r#"{"id":3,"email":"a@b.c","username":"ana","role":"athlete","last_login":null}"#,
        )
        .unwrap();
        assert_eq!(user.role, Role::Athlete);
        assert!(user.date_joined.is_none());
    }

    #[test]
    fn checkout_requests_are_tagged_by_type() {
        let subscription =
            serde_json::to_value(CheckoutRequest::subscription("pro", BillingInterval::Year))
                .unwrap();
        assert_eq!(
            subscription,
            json!({ "type": "subscription", "plan": "pro", "interval": "year" })
        );
        let one_time = serde_json::to_value(CheckoutRequest::pdf_report()).unwrap();
        assert_eq!(one_time, json!({ "type": "one_time", "plan": "pdf_report" }));
    }

    #[test]
    fn checkout_action_selects_the_url() {
        let existing: CheckoutResponse = serde_json::from_value(json!({
            "action": "manage_existing",
            "billing_portal_url": "https://billing.example/portal"
        }))
        .unwrap();
        assert_eq!(
            existing.into_session().unwrap().url(),
            "https://billing.example/portal"
        );

        // An action without its URL is unusable.
        let incomplete: CheckoutResponse =
            serde_json::from_value(json!({ "action": "new_subscription" })).unwrap();
        assert!(matches!(
            incomplete.into_session(),
            Err(ClientError::InvalidRequest(_))
        ));
    }
}
