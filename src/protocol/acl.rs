//! 访问控制条目。
//! Access-control entries.

/// Permission bits attached to an ACL entry.
/// ACL 条目上的权限位。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Permissions(pub u32);

impl Permissions {
    pub const READ: Permissions = Permissions(1);
    pub const WRITE: Permissions = Permissions(1 << 1);
    pub const CREATE: Permissions = Permissions(1 << 2);
    pub const DELETE: Permissions = Permissions(1 << 3);
    pub const ADMIN: Permissions = Permissions(1 << 4);
    pub const ALL: Permissions = Permissions(0x1f);

    pub fn contains(self, other: Permissions) -> bool {
        self.0 & other.0 == other.0
    }
}

impl std::ops::BitOr for Permissions {
    type Output = Permissions;

    fn bitor(self, rhs: Self) -> Self::Output {
        Permissions(self.0 | rhs.0)
    }
}

/// A single access-control entry: `scheme:id` granted `perms`.
/// 单个访问控制条目：授予 `scheme:id` 权限 `perms`。
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Acl {
    pub perms: Permissions,
    pub scheme: String,
    pub id: String,
}

impl Acl {
    pub fn new(perms: Permissions, scheme: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            perms,
            scheme: scheme.into(),
            id: id.into(),
        }
    }

    /// The permissive entry used when a caller supplies no ACL: everyone may do everything.
    /// 调用者未提供 ACL 时使用的宽松条目：任何人均可执行任何操作。
    pub fn open_unsafe() -> Vec<Acl> {
        vec![Acl::new(Permissions::ALL, "world", "anyone")]
    }
}
