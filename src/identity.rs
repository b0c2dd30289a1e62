//! Makes the host user known inside the container.
//!
//! The container runs as `--user=<euid>:<egid>`, which most images have never
//! heard of. We add a `user` group and account with those ids and let them
//! use sudo without a password.

use tracing::info;

use crate::{
    archive::{self, ArchiveError, FileMeta},
    host::Transport,
};

pub const SUDOERS_DIR: &str = "/etc/sudoers.d";
pub const SUDOERS_FILE: &str = "docker-user";
/// `r--r-----`, sudo refuses anything looser
pub const SUDOERS_MODE: u32 = 0o440;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Identity {
    pub uid: u32,
    pub gid: u32,
}

impl Identity {
    pub fn effective() -> Self {
        Identity {
            uid: nix::unistd::geteuid().as_raw(),
            gid: nix::unistd::getegid().as_raw(),
        }
    }

    pub fn group_line(&self) -> String {
        format!("user:x:{}:\n", self.gid)
    }

    pub fn passwd_line(&self, home: &str) -> String {
        format!("user:x:{}:{}:Docker user:{}:/bin/bash\n", self.uid, self.gid, home)
    }

    pub fn sudoers_line(&self) -> String {
        format!("#{} ALL=(ALL) NOPASSWD: ALL\n", self.uid)
    }
}

/// Adds the group, the account and the sudoers drop-in. Root needs none of
/// it, so each part is skipped when the matching id is 0.
///
/// Meant to run once, right after the container is created: the appends are
/// not idempotent.
pub fn provision<T>(
    transport: &T,
    id: &str,
    identity: Identity,
    home: &str,
) -> Result<(), ArchiveError>
where
    T: Transport + ?Sized,
{
    if identity.gid != 0 {
        info!("adding group {}", identity.gid);
        archive::append_to_file(transport, id, "/etc", "group", identity.group_line())?;
    }

    if identity.uid != 0 {
        info!("adding user {}", identity.uid);
        archive::append_to_file(transport, id, "/etc", "passwd", identity.passwd_line(home))?;

        archive::write_file(
            transport,
            id,
            SUDOERS_DIR,
            &FileMeta::new(SUDOERS_FILE, SUDOERS_MODE),
            identity.sudoers_line(),
        )?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{archive::Owner, host::memory::Memory};

    const ID: &str = "f00dfeed";
    const GROUP: &[u8] = b"root:x:0:\n";
    const PASSWD: &[u8] = b"root:x:0:0:root:/root:/bin/bash\n";

    fn container() -> Memory {
        let mem = Memory::default();
        mem.seed("/etc", "group", 0o644, Owner::default(), GROUP);
        mem.seed("/etc", "passwd", 0o644, Owner::default(), PASSWD);
        mem
    }

    #[test]
    fn lines() {
        let me = Identity {
            uid: 1000,
            gid: 100,
        };

        assert_eq!(me.group_line(), "user:x:100:\n");
        assert_eq!(
            me.passwd_line("/user"),
            "user:x:1000:100:Docker user:/user:/bin/bash\n"
        );
        assert_eq!(me.sudoers_line(), "#1000 ALL=(ALL) NOPASSWD: ALL\n");
    }

    #[test]
    fn sudoers_drop_in() {
        let mem = container();
        assert!(mem.file("/etc/sudoers.d/docker-user").is_none());

        provision(
            &mem,
            ID,
            Identity {
                uid: 1000,
                gid: 1000,
            },
            "/user",
        )
        .unwrap();

        let sudoers = mem.file("/etc/sudoers.d/docker-user").unwrap();
        assert_eq!(sudoers.data, b"#1000 ALL=(ALL) NOPASSWD: ALL\n");
        assert_eq!(sudoers.header.mode().unwrap(), 288);
        assert_eq!(sudoers.header.uid().unwrap(), 0);
        assert_eq!(sudoers.header.gid().unwrap(), 0);
    }

    #[test]
    fn group_is_appended_in_order() {
        let mem = container();

        provision(&mem, ID, Identity { uid: 0, gid: 1000 }, "/user").unwrap();

        let group = mem.file("/etc/group").unwrap();
        assert_eq!(group.data, b"root:x:0:\nuser:x:1000:\n");
        assert_eq!(group.header.mode().unwrap(), 0o644);

        // uid 0 leaves passwd and sudoers alone
        assert_eq!(mem.file("/etc/passwd").unwrap().data, PASSWD);
        assert!(mem.file("/etc/sudoers.d/docker-user").is_none());
    }

    #[test]
    fn full_identity() {
        let mem = container();

        provision(&mem, ID, Identity { uid: 501, gid: 20 }, "/user").unwrap();

        assert_eq!(
            mem.file("/etc/passwd").unwrap().data,
            [PASSWD, b"user:x:501:20:Docker user:/user:/bin/bash\n"].concat()
        );
        assert_eq!(
            mem.file("/etc/group").unwrap().data,
            [GROUP, b"user:x:20:\n"].concat()
        );
        assert_eq!(mem.copy_ins(), 3);
    }

    #[test]
    fn root_needs_nothing() {
        let mem = container();

        provision(&mem, ID, Identity { uid: 0, gid: 0 }, "/user").unwrap();

        assert_eq!(mem.copy_ins(), 0);
    }

    #[test]
    fn stops_at_first_failure() {
        // no /etc/group in this image
        let mem = Memory::default();
        mem.seed("/etc", "passwd", 0o644, Owner::default(), PASSWD);

        let err = provision(&mem, ID, Identity { uid: 1000, gid: 1000 }, "/user").unwrap_err();
        assert!(matches!(err, ArchiveError::Transport(_)));

        assert_eq!(mem.file("/etc/passwd").unwrap().data, PASSWD);
        assert_eq!(mem.copy_ins(), 0);
    }
}
