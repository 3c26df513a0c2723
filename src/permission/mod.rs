//! Role capability matrix.
//!
//! One `role_permissions` row per role, seven flags each. Rows are cached in a
//! `DashMap` shared through `web::Data` and reloaded after every edit. Role
//! guards decide who may reach a route; capabilities narrow what they may do
//! there.

use crate::error::AcademyError;
use crate::orm::role_permissions;
use crate::orm::users::Role;
use bitflags::bitflags;
use dashmap::DashMap;
use sea_orm::{entity::*, ActiveValue::Set, ColumnTrait, DatabaseConnection, DbErr, QueryFilter};

bitflags! {
    pub struct Capabilities: u8 {
        const UPLOAD_FILES       = 1 << 0;
        const DELETE_FILES       = 1 << 1;
        const MANAGE_USERS       = 1 << 2;
        const MANAGE_COURSES     = 1 << 3;
        const SEND_NOTIFICATIONS = 1 << 4;
        const VIEW_REPORTS       = 1 << 5;
        const USE_AI             = 1 << 6;
    }
}

/// Flag, form field name, label. Form field names match the column names.
pub const CAPABILITY_FIELDS: [(Capabilities, &str, &str); 7] = [
    (Capabilities::UPLOAD_FILES, "can_upload_files", "Upload files"),
    (Capabilities::DELETE_FILES, "can_delete_files", "Delete files"),
    (Capabilities::MANAGE_USERS, "can_manage_users", "Manage users"),
    (Capabilities::MANAGE_COURSES, "can_manage_courses", "Manage courses"),
    (
        Capabilities::SEND_NOTIFICATIONS,
        "can_send_notifications",
        "Send notifications",
    ),
    (Capabilities::VIEW_REPORTS, "can_view_reports", "View reports"),
    (Capabilities::USE_AI, "can_use_ai", "Use AI tools"),
];

impl Capabilities {
    /// Seeded matrix for a fresh install.
    pub fn defaults_for(role: Role) -> Self {
        match role {
            Role::Student => Capabilities::USE_AI,
            Role::Teacher => {
                Capabilities::UPLOAD_FILES
                    | Capabilities::DELETE_FILES
                    | Capabilities::SEND_NOTIFICATIONS
                    | Capabilities::VIEW_REPORTS
                    | Capabilities::USE_AI
            }
            Role::Admin => Capabilities::all(),
        }
    }

    pub fn from_model(m: &role_permissions::Model) -> Self {
        let mut caps = Capabilities::empty();
        caps.set(Capabilities::UPLOAD_FILES, m.can_upload_files);
        caps.set(Capabilities::DELETE_FILES, m.can_delete_files);
        caps.set(Capabilities::MANAGE_USERS, m.can_manage_users);
        caps.set(Capabilities::MANAGE_COURSES, m.can_manage_courses);
        caps.set(Capabilities::SEND_NOTIFICATIONS, m.can_send_notifications);
        caps.set(Capabilities::VIEW_REPORTS, m.can_view_reports);
        caps.set(Capabilities::USE_AI, m.can_use_ai);
        caps
    }

    fn write_to(self, active: &mut role_permissions::ActiveModel) {
        active.can_upload_files = Set(self.contains(Capabilities::UPLOAD_FILES));
        active.can_delete_files = Set(self.contains(Capabilities::DELETE_FILES));
        active.can_manage_users = Set(self.contains(Capabilities::MANAGE_USERS));
        active.can_manage_courses = Set(self.contains(Capabilities::MANAGE_COURSES));
        active.can_send_notifications = Set(self.contains(Capabilities::SEND_NOTIFICATIONS));
        active.can_view_reports = Set(self.contains(Capabilities::VIEW_REPORTS));
        active.can_use_ai = Set(self.contains(Capabilities::USE_AI));
    }

    /// Builds a set from the checkbox names present in a submitted form.
    pub fn from_field_names<'a, I: IntoIterator<Item = &'a str>>(names: I) -> Self {
        let mut caps = Capabilities::empty();
        for name in names {
            if let Some((flag, _, _)) = CAPABILITY_FIELDS.iter().find(|(_, n, _)| *n == name) {
                caps |= *flag;
            }
        }
        caps
    }
}

/// In-memory copy of the `role_permissions` table.
#[derive(Debug)]
pub struct RolePermissions {
    by_role: DashMap<Role, Capabilities>,
}

impl Default for RolePermissions {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl RolePermissions {
    pub fn with_defaults() -> Self {
        let by_role = DashMap::new();
        for role in Role::ALL {
            by_role.insert(role, Capabilities::defaults_for(role));
        }
        Self { by_role }
    }

    pub async fn load(db: &DatabaseConnection) -> Result<Self, DbErr> {
        let perms = Self::with_defaults();
        perms.reload(db).await?;
        Ok(perms)
    }

    /// Refreshes the cache from the database. Roles without a row keep
    /// their seeded defaults.
    pub async fn reload(&self, db: &DatabaseConnection) -> Result<(), DbErr> {
        let rows = role_permissions::Entity::find().all(db).await?;

        for role in Role::ALL {
            match rows.iter().find(|r| r.role == role) {
                Some(row) => {
                    self.by_role.insert(role, Capabilities::from_model(row));
                }
                None => {
                    log::warn!("No role_permissions row for '{}', using defaults", role.as_str());
                    self.by_role.insert(role, Capabilities::defaults_for(role));
                }
            }
        }

        log::debug!("Role permissions loaded: {:?}", self.by_role);
        Ok(())
    }

    pub fn get(&self, role: Role) -> Capabilities {
        self.by_role
            .get(&role)
            .map(|c| *c)
            .unwrap_or_else(Capabilities::empty)
    }

    pub fn can(&self, role: Role, cap: Capabilities) -> bool {
        self.get(role).contains(cap)
    }
}

/// Inserts the seeded row for every role that has none. Existing rows are
/// left untouched. Returns the roles that were created.
pub async fn ensure_role_rows(db: &DatabaseConnection) -> Result<Vec<Role>, DbErr> {
    let mut created = Vec::new();

    for role in Role::ALL {
        let exists = role_permissions::Entity::find()
            .filter(role_permissions::Column::Role.eq(role))
            .one(db)
            .await?
            .is_some();
        if exists {
            continue;
        }

        let mut row = role_permissions::ActiveModel {
            role: Set(role),
            ..Default::default()
        };
        Capabilities::defaults_for(role).write_to(&mut row);
        row.insert(db).await?;
        created.push(role);
    }

    Ok(created)
}

/// Stores new flags for a role and refreshes the cache.
pub async fn update_role(
    db: &DatabaseConnection,
    perms: &RolePermissions,
    role: Role,
    caps: Capabilities,
) -> Result<role_permissions::Model, AcademyError> {
    let existing = role_permissions::Entity::find()
        .filter(role_permissions::Column::Role.eq(role))
        .one(db)
        .await?;

    let model = match existing {
        Some(row) => {
            let mut active: role_permissions::ActiveModel = row.into();
            caps.write_to(&mut active);
            active.update(db).await?
        }
        None => {
            let mut active = role_permissions::ActiveModel {
                role: Set(role),
                ..Default::default()
            };
            caps.write_to(&mut active);
            active.insert(db).await?
        }
    };

    perms.reload(db).await?;
    log::info!("Role permissions for '{}' set to {:?}", role.as_str(), caps);
    Ok(model)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seeded_defaults() {
        let perms = RolePermissions::with_defaults();
        assert_eq!(perms.get(Role::Student), Capabilities::USE_AI);
        assert!(perms.can(Role::Teacher, Capabilities::UPLOAD_FILES));
        assert!(perms.can(Role::Teacher, Capabilities::SEND_NOTIFICATIONS));
        assert!(!perms.can(Role::Teacher, Capabilities::MANAGE_USERS));
        assert!(!perms.can(Role::Teacher, Capabilities::MANAGE_COURSES));
        assert_eq!(perms.get(Role::Admin), Capabilities::all());
    }

    #[test]
    fn test_from_field_names_ignores_unknown() {
        let caps = Capabilities::from_field_names(["can_use_ai", "can_fly", "can_view_reports"]);
        assert_eq!(caps, Capabilities::USE_AI | Capabilities::VIEW_REPORTS);
    }

    #[test]
    fn test_model_round_trip() {
        let model = role_permissions::Model {
            id: 1,
            role: Role::Teacher,
            can_upload_files: true,
            can_delete_files: false,
            can_manage_users: false,
            can_manage_courses: true,
            can_send_notifications: false,
            can_view_reports: false,
            can_use_ai: true,
        };
        let caps = Capabilities::from_model(&model);
        assert_eq!(
            caps,
            Capabilities::UPLOAD_FILES | Capabilities::MANAGE_COURSES | Capabilities::USE_AI
        );
    }
}
