use crate::config::Config;
use crate::data_service::{DataService, HttpDataService};
use crate::errors::PortalError;
use crate::notifier::{NotificationDispatcher, SmtpNotifier};
use crate::resolver::ReferrerResolver;
use crate::submission::{FeedbackRecord, FeedbackSubmitter, Submission};
use crate::views::{Flash, FormContext, render_form, render_thanks};
use http::header::{CACHE_CONTROL, CONTENT_TYPE, COOKIE, LOCATION, REFERER, SET_COOKIE};
use http::response::Builder;
use http_body_util::{BodyExt, LengthLimitError, Limited};
use hyper::body::{Body, Incoming};
use hyper::service::Service;
use hyper::{HeaderMap, Method, Request, Response, StatusCode};
use shared::http::{ResponseBody, full_body, make_boxed_error_response};
use std::convert::Infallible;
use std::error::Error as StdError;
use std::future::Future;
use std::net::{IpAddr, SocketAddr};
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

const MAX_FORM_BYTES: usize = 64 * 1024;
const FLASH_MAX_AGE_SECS: u32 = 60;

enum Route {
    Form,
    Submit,
    Thanks,
    MethodNotAllowed,
    NotFound,
}

fn route<B>(req: &Request<B>) -> Route {
    match (req.method(), req.uri().path()) {
        (&Method::GET, "/") => Route::Form,
        (&Method::POST, "/") => Route::Submit,
        (&Method::GET, "/thanks") => Route::Thanks,
        (_, "/" | "/thanks") => Route::MethodNotAllowed,
        _ => Route::NotFound,
    }
}

/// Request handling shared by every connection.
pub struct Portal {
    resolver: ReferrerResolver,
    submitter: FeedbackSubmitter,
    trust_forwarded_for: bool,
}

impl Portal {
    pub fn new(
        resolver: ReferrerResolver,
        submitter: FeedbackSubmitter,
        trust_forwarded_for: bool,
    ) -> Self {
        Portal {
            resolver,
            submitter,
            trust_forwarded_for,
        }
    }

    pub fn from_config(config: &Config) -> Result<Self, PortalError> {
        let data_service: Arc<dyn DataService> =
            Arc::new(HttpDataService::new(&config.data_service));
        let notifier = SmtpNotifier::new(&config.smtp, &config.notification)?;
        let dispatcher = NotificationDispatcher::new(
            Arc::new(notifier),
            Duration::from_secs(config.smtp.timeout_secs),
        );

        Ok(Portal::new(
            ReferrerResolver::new(data_service.clone()),
            FeedbackSubmitter::new(data_service, dispatcher),
            config.trust_forwarded_for,
        ))
    }

    pub async fn handle<B>(&self, req: Request<B>, peer: SocketAddr) -> Response<ResponseBody>
    where
        B: Body,
        B::Error: Into<Box<dyn StdError + Send + Sync>>,
    {
        match route(&req) {
            Route::Form => {
                let referrer = referrer(req.headers());
                let flash = flash(req.headers());
                self.feedback_form(referrer, flash).await
            }
            Route::Submit => self.submit(req, peer).await,
            Route::Thanks => html(Response::builder(), render_thanks()),
            Route::MethodNotAllowed => make_boxed_error_response(StatusCode::METHOD_NOT_ALLOWED),
            Route::NotFound => make_boxed_error_response(StatusCode::NOT_FOUND),
        }
    }

    async fn feedback_form(
        &self,
        referrer: Option<String>,
        flash: Option<Flash>,
    ) -> Response<ResponseBody> {
        let context = self.resolver.resolve(referrer.as_deref()).await;
        let form = FormContext::from(context).with_flash(flash);

        let mut builder = Response::builder();
        if flash.is_some() {
            // Shown once
            builder = builder.header(SET_COOKIE, flash_cookie("", 0));
        }

        html(builder, render_form(&form))
    }

    async fn submit<B>(&self, req: Request<B>, peer: SocketAddr) -> Response<ResponseBody>
    where
        B: Body,
        B::Error: Into<Box<dyn StdError + Send + Sync>>,
    {
        let requester = requester_ip(req.headers(), peer.ip(), self.trust_forwarded_for);

        let body = match Limited::new(req.into_body(), MAX_FORM_BYTES).collect().await {
            Ok(collected) => collected.to_bytes(),
            Err(e) if e.is::<LengthLimitError>() => {
                return make_boxed_error_response(StatusCode::PAYLOAD_TOO_LARGE);
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to read feedback form");
                return make_boxed_error_response(StatusCode::BAD_REQUEST);
            }
        };

        let record = FeedbackRecord::from_form(url::form_urlencoded::parse(&body), requester);

        match self.submitter.submit(record).await {
            Submission::Accepted { .. } => redirect("/thanks", None),
            Submission::Rejected(_) => redirect("/", Some(Flash::SubmissionFailed)),
        }
    }
}

/// Per-connection hyper service carrying the peer address.
#[derive(Clone)]
pub struct FeedbackService {
    portal: Arc<Portal>,
    peer: SocketAddr,
}

impl FeedbackService {
    pub fn new(portal: Arc<Portal>, peer: SocketAddr) -> Self {
        FeedbackService { portal, peer }
    }
}

impl Service<Request<Incoming>> for FeedbackService {
    type Response = Response<ResponseBody>;
    type Error = Infallible;
    type Future =
        Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send + 'static>>;

    fn call(&self, req: Request<Incoming>) -> Self::Future {
        tracing::debug!(method = %req.method(), path = %req.uri().path(), peer = %self.peer, "Received request");
        let portal = self.portal.clone();
        let peer = self.peer;

        Box::pin(async move { Ok(portal.handle(req, peer).await) })
    }
}

fn referrer(headers: &HeaderMap) -> Option<String> {
    headers
        .get(REFERER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(String::from)
}

fn flash(headers: &HeaderMap) -> Option<Flash> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == Flash::COOKIE)
        .and_then(|(_, code)| Flash::from_code(code))
}

fn requester_ip(headers: &HeaderMap, peer: IpAddr, trust_forwarded_for: bool) -> IpAddr {
    if !trust_forwarded_for {
        return peer;
    }

    headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .and_then(|first| first.trim().parse().ok())
        .unwrap_or(peer)
}

fn html(builder: Builder, page: String) -> Response<ResponseBody> {
    finish(
        builder
            .status(StatusCode::OK)
            .header(CONTENT_TYPE, "text/html; charset=utf-8")
            .header(CACHE_CONTROL, "no-store"),
        page,
    )
}

fn redirect(location: &'static str, flash: Option<Flash>) -> Response<ResponseBody> {
    let mut builder = Response::builder()
        .status(StatusCode::SEE_OTHER)
        .header(LOCATION, location);

    if let Some(flash) = flash {
        builder = builder.header(SET_COOKIE, flash_cookie(flash.code(), FLASH_MAX_AGE_SECS));
    }

    finish(builder, String::new())
}

fn flash_cookie(value: &str, max_age_secs: u32) -> String {
    format!(
        "{}={value}; Path=/; Max-Age={max_age_secs}; HttpOnly; SameSite=Lax",
        Flash::COOKIE
    )
}

fn finish(builder: Builder, body: String) -> Response<ResponseBody> {
    builder.body(full_body(body)).unwrap_or_else(|e| {
        tracing::error!(error = %e, "Failed to build response");
        make_boxed_error_response(StatusCode::INTERNAL_SERVER_ERROR)
    })
}
