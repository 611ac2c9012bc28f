use actix_web::body::EitherBody;
use actix_web::dev::{Payload, Service, ServiceRequest, ServiceResponse, Transform, forward_ready};
use actix_web::{Error, FromRequest, HttpMessage, HttpRequest, HttpResponse, http::header};
use futures::future::{LocalBoxFuture, Ready, ready};
use std::rc::Rc;
use std::sync::Arc;

use super::jwt::{JwtError, JwtService};
use super::models::AuthUser;

/// Paths served without a session: liveness and stored images (whose names
/// are random UUIDs).
fn is_public_path(path: &str) -> bool {
    path == "/api/health" || path.starts_with("/uploads/")
}

/// Why a protected request was turned away.
enum Rejection {
    NoBearerToken,
    BadToken(JwtError),
}

impl Rejection {
    fn client_message(&self) -> &'static str {
        match self {
            Rejection::NoBearerToken => "Missing or invalid authorization token",
            Rejection::BadToken(_) => "Token verification failed",
        }
    }
}

fn bearer_token(req: &ServiceRequest) -> Option<&str> {
    req.headers()
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
}

fn authenticate(req: &ServiceRequest, jwt: &JwtService) -> Result<AuthUser, Rejection> {
    let token = bearer_token(req).ok_or(Rejection::NoBearerToken)?;
    let claims = jwt.verify_token(token).map_err(Rejection::BadToken)?;
    Ok(AuthUser::from(claims))
}

/// Verifies the bearer token on every non-public request and stores the
/// caller's `AuthUser` in the request extensions.
#[derive(Clone)]
pub struct AuthMiddleware {
    jwt: Arc<JwtService>,
}

impl AuthMiddleware {
    pub fn new(jwt: JwtService) -> Self {
        Self { jwt: Arc::new(jwt) }
    }
}

impl<S, B> Transform<S, ServiceRequest> for AuthMiddleware
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Transform = AuthMiddlewareService<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(AuthMiddlewareService {
            service: Rc::new(service),
            jwt: self.jwt.clone(),
        }))
    }
}

pub struct AuthMiddlewareService<S> {
    service: Rc<S>,
    jwt: Arc<JwtService>,
}

impl<S, B> Service<ServiceRequest> for AuthMiddlewareService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let service = Rc::clone(&self.service);

        let outcome = if is_public_path(req.path()) {
            None
        } else {
            Some(authenticate(&req, &self.jwt))
        };

        Box::pin(async move {
            match outcome {
                None => {}
                Some(Ok(user)) => {
                    log::debug!("Authenticated {} for {}", user.id, req.path());
                    req.extensions_mut().insert(user);
                }
                Some(Err(rejection)) => {
                    match &rejection {
                        Rejection::NoBearerToken => {
                            log::warn!("No bearer token on {}", req.path())
                        }
                        Rejection::BadToken(e) => {
                            log::warn!("Rejected token on {}: {}", req.path(), e)
                        }
                    }
                    let response = HttpResponse::Unauthorized()
                        .json(serde_json::json!({ "error": rejection.client_message() }));
                    return Ok(req.into_response(response).map_into_right_body());
                }
            }
            service.call(req).await.map(ServiceResponse::map_into_left_body)
        })
    }
}

/// Verified identity placed in the request by `AuthMiddleware`.
pub struct AuthenticatedUser(pub AuthUser);

impl AuthenticatedUser {
    pub fn id(&self) -> &str {
        &self.0.id
    }
}

impl FromRequest for AuthenticatedUser {
    type Error = Error;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        let user = req.extensions().get::<AuthUser>().cloned();
        ready(user.map(AuthenticatedUser).ok_or_else(|| {
            log::warn!("No verified user on {}", req.path());
            actix_web::error::ErrorUnauthorized("Missing or invalid authorization token")
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::test::TestRequest;

    #[test]
    fn only_health_and_uploads_are_public() {
        assert!(is_public_path("/api/health"));
        assert!(is_public_path("/uploads/3f0c.png"));
        assert!(!is_public_path("/api/history"));
        assert!(!is_public_path("/uploads"));
    }

    #[test]
    fn bearer_token_requires_the_bearer_scheme() {
        let req = TestRequest::default()
            .insert_header((header::AUTHORIZATION, "Bearer  abc.def.ghi "))
            .to_srv_request();
        assert_eq!(bearer_token(&req), Some("abc.def.ghi"));

        let req = TestRequest::default()
            .insert_header((header::AUTHORIZATION, "Basic dXNlcjpwYXNz"))
            .to_srv_request();
        assert_eq!(bearer_token(&req), None);

        assert_eq!(bearer_token(&TestRequest::default().to_srv_request()), None);
    }
}
