use crate::{
    Account, EngineError, OpContext, ResultEngine, UserId,
    store::StoreError,
};

use super::{Engine, with_unit};

impl Engine {
    /// Register a user together with its default, empty account.
    ///
    /// The password is stored as given; hashing belongs to whoever
    /// authenticates against it.
    pub async fn register_user(
        &self,
        username: &str,
        password: &str,
    ) -> ResultEngine<(UserId, Account)> {
        let username = username.trim();
        if username.is_empty() || password.is_empty() {
            return Err(EngineError::Validation(
                "username and password are required".to_string(),
            ));
        }

        with_unit!(self, OpContext::new("register_user"), |unit| {
            if unit.find_user_by_username(username).await?.is_some() {
                return Err(taken(username));
            }
            // A concurrent registration may win between the lookup and the insert.
            let user = match unit.insert_user(username, password, self.ids.now()).await {
                Err(StoreError::Duplicate(_)) => return Err(taken(username)),
                inserted => inserted?,
            };
            let account = self.open_in(unit, user.id).await?;
            Ok((user.id, account))
        })
    }
}

fn taken(username: &str) -> EngineError {
    EngineError::Validation(format!("username {username} is already taken"))
}
