pub struct UserCreateRequest {
    pub name: String,
    pub email: String,
    pub password_hash: String,
}

/// Fields left as `None` keep their stored value.
#[derive(Default)]
pub struct UserUpdateRequest {
    pub name: Option<String>,
    pub email: Option<String>,
}
