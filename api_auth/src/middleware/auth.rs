use std::{future::Future, pin::Pin, rc::Rc, sync::Arc};

use actix_web::{
    Error, HttpMessage,
    dev::{Service, ServiceRequest, ServiceResponse, Transform, forward_ready},
    http::Method,
};
use common::{
    error::AppError,
    jwt::{TokenIssuer, TokenKind},
};
use futures::future::{Ready, ok};

/// Bearer-token guard. Verified `JwtClaims` are inserted into the request
/// extensions for handlers to pick up with `web::ReqData<JwtClaims>`.
pub struct AuthMiddleware {
    issuer: Arc<TokenIssuer>,
    public_reads: bool,
}

impl AuthMiddleware {
    pub fn new(issuer: Arc<TokenIssuer>) -> Self {
        AuthMiddleware {
            issuer,
            public_reads: false,
        }
    }

    /// Lets GET and HEAD requests through without a token.
    pub fn public_reads(mut self) -> Self {
        self.public_reads = true;
        self
    }
}

impl<S, B> Transform<S, ServiceRequest> for AuthMiddleware
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    B: actix_web::body::MessageBody + 'static,
{
    type Response = ServiceResponse<actix_web::body::BoxBody>;
    type Error = Error;
    type Transform = AuthMiddlewareService<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ok(AuthMiddlewareService {
            service: Rc::new(service),
            issuer: self.issuer.clone(),
            public_reads: self.public_reads,
        })
    }
}

pub struct AuthMiddlewareService<S> {
    service: Rc<S>,
    issuer: Arc<TokenIssuer>,
    public_reads: bool,
}

impl<S, B> Service<ServiceRequest> for AuthMiddlewareService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    B: actix_web::body::MessageBody + 'static,
{
    type Response = ServiceResponse<actix_web::body::BoxBody>;
    type Error = Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>>>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        if self.public_reads && (req.method() == Method::GET || req.method() == Method::HEAD) {
            let fut = self.service.call(req);
            return Box::pin(async move { fut.await.map(|res| res.map_into_boxed_body()) });
        }

        let token = req
            .headers()
            .get("Authorization")
            .and_then(|header| header.to_str().ok())
            .and_then(|header| header.strip_prefix("Bearer "))
            .map(|token| token.trim().to_string());

        let verified = match token {
            Some(token) => self.issuer.verify(&token, TokenKind::Access),
            None => Err(AppError::Unauthorized(
                "No authorization token provided".to_string(),
            )),
        };

        match verified {
            Ok(claims) => {
                req.extensions_mut().insert(claims);
                let fut = self.service.call(req);
                Box::pin(async move { fut.await.map(|res| res.map_into_boxed_body()) })
            }
            Err(err) => {
                let response = err.to_http_response();
                Box::pin(async move { Ok(req.into_response(response)) })
            }
        }
    }
}
