use mongodb::bson::doc;
use rocket::{
    futures::TryStreamExt,
    http::Status,
    response::status,
    serde::json::Json,
    Route,
};

use crate::error::{Error, Result};
use crate::model::{
    api::{
        auth::{rights::Admin, AuthToken},
        user::{ApproveRequest, NewUserRequest, UpdateUserRequest, UserSummary},
    },
    common::Role,
    db::user::{NewUser, User},
    mongodb::{is_duplicate_key_error, Coll, Id},
};

pub fn routes() -> Vec<Route> {
    routes![
        pending_users,
        approve_user,
        reject_user,
        list_users,
        create_user,
        update_user,
        delete_user,
    ]
}

#[get("/admin/pending-users")]
async fn pending_users(
    _token: AuthToken<Admin>,
    users: Coll<User>,
) -> Result<Json<Vec<UserSummary>>> {
    let pending: Vec<User> = users
        .find(doc! { "role": Role::Pending }, None)
        .await?
        .try_collect()
        .await?;
    Ok(Json(pending.into_iter().map(Into::into).collect()))
}

#[post("/admin/users/<user_id>/approve", data = "<request>", format = "json")]
async fn approve_user(
    _token: AuthToken<Admin>,
    user_id: Id,
    request: Json<ApproveRequest>,
    users: Coll<User>,
) -> Result<Json<UserSummary>> {
    if request.role == Role::Pending {
        return Err(Error::BadRequest(
            "Cannot approve an account into the pending role".to_string(),
        ));
    }

    let user = users
        .find_one(user_id.as_doc(), None)
        .await?
        .ok_or_else(|| Error::not_found(format!("User {} not found", user_id)))?;
    if user.role != Role::Pending {
        return Err(Error::InvalidState(format!(
            "User {} is not pending",
            user_id
        )));
    }

    let update = doc! {
        "$set": { "role": request.role },
    };
    users.update_one(user_id.as_doc(), update, None).await?;
    info!("Approved account {} as {}", user_id, request.role);

    let user = users.find_one(user_id.as_doc(), None).await?.unwrap();
    Ok(Json(user.into()))
}

#[post("/admin/users/<user_id>/reject")]
async fn reject_user(_token: AuthToken<Admin>, user_id: Id, users: Coll<User>) -> Result<()> {
    let user = users
        .find_one(user_id.as_doc(), None)
        .await?
        .ok_or_else(|| Error::not_found(format!("User {} not found", user_id)))?;
    if user.role != Role::Pending {
        return Err(Error::InvalidState(format!(
            "User {} is not pending",
            user_id
        )));
    }

    users.delete_one(user_id.as_doc(), None).await?;
    info!("Rejected registration {}", user_id);
    Ok(())
}

#[get("/admin/users?<role>")]
async fn list_users(
    _token: AuthToken<Admin>,
    role: Option<Role>,
    users: Coll<User>,
) -> Result<Json<Vec<UserSummary>>> {
    let filter = role.map(|role| doc! { "role": role });
    let listed: Vec<User> = users.find(filter, None).await?.try_collect().await?;
    Ok(Json(listed.into_iter().map(Into::into).collect()))
}

#[post("/admin/users", data = "<request>", format = "json")]
async fn create_user(
    _token: AuthToken<Admin>,
    request: Json<NewUserRequest>,
    new_users: Coll<NewUser>,
    users: Coll<User>,
) -> Result<status::Custom<Json<UserSummary>>> {
    let request = request.0;
    request.validate()?;

    let user = NewUser::new(
        request.name.trim(),
        &request.email,
        &request.password,
        request.role,
    );
    let new_id: Id = match new_users.insert_one(&user, None).await {
        Ok(insert) => insert
            .inserted_id
            .as_object_id()
            .unwrap() // Valid because the ID comes directly from the DB.
            .into(),
        Err(err) if is_duplicate_key_error(&err) => {
            return Err(Error::Conflict("Email already exists".to_string()));
        }
        Err(err) => return Err(err.into()),
    };
    info!("Admin created account {} with role {}", new_id, user.role);

    let user = users.find_one(new_id.as_doc(), None).await?.unwrap();
    Ok(status::Custom(Status::Created, Json(user.into())))
}

#[patch("/admin/users/<user_id>", data = "<request>", format = "json")]
async fn update_user(
    _token: AuthToken<Admin>,
    user_id: Id,
    request: Json<UpdateUserRequest>,
    users: Coll<User>,
) -> Result<Json<UserSummary>> {
    let request = request.0;
    request.validate()?;

    let mut user = users
        .find_one(user_id.as_doc(), None)
        .await?
        .ok_or_else(|| Error::not_found(format!("User {} not found", user_id)))?;

    if let Some(name) = request.name {
        user.name = name.trim().to_string();
    }
    if let Some(role) = request.role {
        user.role = role;
    }
    if let Some(password) = request.password {
        user.set_password(password);
    }

    users
        .replace_one(user_id.as_doc(), &user, None)
        .await?;
    Ok(Json(user.into()))
}

#[delete("/admin/users/<user_id>")]
async fn delete_user(_token: AuthToken<Admin>, user_id: Id, users: Coll<User>) -> Result<()> {
    let user = users
        .find_one(user_id.as_doc(), None)
        .await?
        .ok_or_else(|| Error::not_found(format!("User {} not found", user_id)))?;

    // Prevent deleting the last admin.
    if user.role == Role::Admin {
        let admins = users
            .count_documents(doc! { "role": Role::Admin }, None)
            .await?;
        if admins == 1 {
            return Err(Error::InvalidState(
                "Cannot delete the last admin".to_string(),
            ));
        }
    }

    users.delete_one(user_id.as_doc(), None).await?;
    warn!("Admin deleted account {}", user_id);
    Ok(())
}
