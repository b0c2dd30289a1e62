//! A fake container filesystem that speaks the same tar streams as `docker cp`

use std::{
    cell::{Cell, RefCell},
    collections::BTreeMap,
    io::Read,
    os::unix::process::ExitStatusExt,
    process::ExitStatus,
};

use super::{Transport, TransportError};
use crate::archive::Owner;

#[derive(Clone, Debug)]
pub struct StoredFile {
    pub header: tar::Header,
    pub data: Vec<u8>,
}

#[derive(Default)]
pub struct Memory {
    files: RefCell<BTreeMap<String, StoredFile>>,
    copy_ins: Cell<usize>,
}

impl Memory {
    pub fn file(&self, path: &str) -> Option<StoredFile> {
        self.files.borrow().get(path).cloned()
    }

    /// how many archives were unpacked so far
    pub fn copy_ins(&self) -> usize {
        self.copy_ins.get()
    }

    /// Puts a file in place without going through `copy_in`
    pub fn seed(&self, dir: &str, name: &str, mode: u32, owner: Owner, data: &[u8]) {
        let mut header = tar::Header::new_gnu();
        header.set_path(name).unwrap();
        header.set_size(data.len() as u64);
        header.set_mode(mode);
        header.set_uid(owner.uid);
        header.set_gid(owner.gid);
        header.set_username(&owner.uname).unwrap();
        header.set_groupname(&owner.gname).unwrap();
        header.set_cksum();

        self.files.borrow_mut().insert(
            format!("{}/{}", dir.trim_end_matches('/'), name),
            StoredFile {
                header,
                data: data.to_vec(),
            },
        );
    }
}

impl Transport for Memory {
    fn copy_out(&self, id: &str, path: &str) -> Result<Vec<u8>, TransportError> {
        let files = self.files.borrow();
        let stored = files.get(path).ok_or_else(|| TransportError::Failed {
            command: format!("docker cp {}:{} -", id, path),
            status: ExitStatus::from_raw(1 << 8),
            stderr: format!(
                "Error response from daemon: Could not find the file {} in container {}",
                path, id
            ),
        })?;

        let name = path.rsplit('/').next().unwrap_or(path);
        let mut header = stored.header.clone();
        let mut builder = tar::Builder::new(Vec::new());
        builder.append_data(&mut header, name, stored.data.as_slice())?;

        Ok(builder.into_inner()?)
    }

    fn copy_in(&self, _id: &str, dir: &str, archive: &[u8]) -> Result<(), TransportError> {
        self.copy_ins.set(self.copy_ins.get() + 1);

        let mut archive = tar::Archive::new(archive);
        for entry in archive.entries()? {
            let mut entry = entry?;
            let path = format!(
                "{}/{}",
                dir.trim_end_matches('/'),
                entry.path()?.display()
            );
            let header = entry.header().clone();

            let mut data = Vec::new();
            entry.read_to_end(&mut data)?;

            self.files
                .borrow_mut()
                .insert(path, StoredFile { header, data });
        }

        Ok(())
    }
}
