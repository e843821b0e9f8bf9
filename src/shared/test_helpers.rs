use axum::{extract::Request, middleware::Next, response::Response, Router};
use fake::{Fake, Faker};

use crate::features::auth::model::{AuthenticatedUser, Role};

pub fn user_with_role(role: Role) -> AuthenticatedUser {
    AuthenticatedUser {
        id: Faker.fake::<uuid::Uuid>(),
        role,
    }
}

pub fn admin_user() -> AuthenticatedUser {
    user_with_role(Role::Admin)
}

/// Put `user` into the request extensions, as the auth middleware would
pub fn with_user(router: Router, user: AuthenticatedUser) -> Router {
    router.layer(axum::middleware::from_fn(
        move |mut request: Request, next: Next| {
            let user = user.clone();
            async move {
                request.extensions_mut().insert(user);
                let response: Response = next.run(request).await;
                response
            }
        },
    ))
}
