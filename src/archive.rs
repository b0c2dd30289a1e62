//! Writes and appends to files inside a running container, without a shell.
//!
//! Everything goes through tar streams: a file is written by building a
//! single entry archive and unpacking it into the target directory, and a
//! file is extended by copying it out, decoding the entry and writing the
//! concatenation back.

use std::{
    io::Read,
    path::Path,
    time::{SystemTime, UNIX_EPOCH},
};
use tracing::{debug, info};

use crate::host::{Transport, TransportError};

/// File content, either text or raw bytes
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Payload {
    Text(String),
    Bytes(Vec<u8>),
}

impl Payload {
    /// Text is always encoded as utf-8
    pub fn into_bytes(self) -> Vec<u8> {
        match self {
            Payload::Text(s) => s.into_bytes(),
            Payload::Bytes(b) => b,
        }
    }
}

impl From<String> for Payload {
    fn from(s: String) -> Self {
        Payload::Text(s)
    }
}

impl From<&str> for Payload {
    fn from(s: &str) -> Self {
        Payload::Text(s.to_string())
    }
}

impl From<Vec<u8>> for Payload {
    fn from(b: Vec<u8>) -> Self {
        Payload::Bytes(b)
    }
}

impl From<&[u8]> for Payload {
    fn from(b: &[u8]) -> Self {
        Payload::Bytes(b.to_vec())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Owner {
    pub uid: u64,
    pub gid: u64,
    pub uname: String,
    pub gname: String,
}

impl Default for Owner {
    fn default() -> Self {
        Owner {
            uid: 0,
            gid: 0,
            uname: String::from("root"),
            gname: String::from("root"),
        }
    }
}

/// Everything in a tar header except the size, which always comes from the
/// payload when the header is built
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FileMeta {
    pub name: String,
    pub mode: u32,
    /// seconds since the epoch
    pub mtime: u64,
    pub owner: Owner,
}

impl FileMeta {
    /// Root owned, stamped with the current time
    pub fn new(name: impl Into<String>, mode: u32) -> Self {
        FileMeta {
            name: name.into(),
            mode,
            mtime: now(),
            owner: Owner::default(),
        }
    }

    pub fn owned_by(mut self, owner: Owner) -> Self {
        self.owner = owner;
        self
    }

    fn header(&self, size: u64) -> Result<tar::Header, ArchiveError> {
        let mut header = tar::Header::new_gnu();
        header.set_entry_type(tar::EntryType::Regular);
        header.set_size(size);
        header.set_mode(self.mode);
        header.set_mtime(self.mtime);
        header.set_uid(self.owner.uid);
        header.set_gid(self.owner.gid);
        header
            .set_username(&self.owner.uname)
            .map_err(ArchiveError::Encode)?;
        header
            .set_groupname(&self.owner.gname)
            .map_err(ArchiveError::Encode)?;
        Ok(header)
    }

    fn from_header(name: &str, header: &tar::Header) -> Result<Self, ArchiveError> {
        let text = |field: Result<Option<&str>, std::str::Utf8Error>| {
            field
                .map(|s| s.unwrap_or_default().to_string())
                .map_err(|e| {
                    ArchiveError::Decode(std::io::Error::new(std::io::ErrorKind::InvalidData, e))
                })
        };

        Ok(FileMeta {
            name: name.to_string(),
            mode: header.mode().map_err(ArchiveError::Decode)?,
            mtime: header.mtime().map_err(ArchiveError::Decode)?,
            owner: Owner {
                uid: header.uid().map_err(ArchiveError::Decode)?,
                gid: header.gid().map_err(ArchiveError::Decode)?,
                uname: text(header.username())?,
                gname: text(header.groupname())?,
            },
        })
    }

    /// Pax records win over the plain header fields. Go's tar writer (and so
    /// `docker cp`) falls back to them for ids and names that don't fit.
    fn apply_pax<R: Read>(&mut self, entry: &mut tar::Entry<'_, R>) -> Result<(), ArchiveError> {
        let Some(extensions) = entry.pax_extensions().map_err(ArchiveError::Decode)? else {
            return Ok(());
        };

        for ext in extensions {
            let ext = ext.map_err(ArchiveError::Decode)?;
            let (Ok(key), Ok(value)) = (ext.key(), ext.value()) else {
                continue;
            };

            match key {
                "uid" => self.owner.uid = pax_number(key, value)?,
                "gid" => self.owner.gid = pax_number(key, value)?,
                "uname" => self.owner.uname = value.to_string(),
                "gname" => self.owner.gname = value.to_string(),
                // may carry a fraction, headers only hold whole seconds
                "mtime" => {
                    self.mtime = pax_number(key, value.split('.').next().unwrap_or(value))?
                }
                _ => {}
            }
        }

        Ok(())
    }
}

fn pax_number(key: &str, value: &str) -> Result<u64, ArchiveError> {
    value.parse().map_err(|_| {
        ArchiveError::Decode(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("pax record {}={} is not a number", key, value),
        ))
    })
}

/// A decoded archive member
#[derive(Clone, Debug)]
pub struct Entry {
    pub meta: FileMeta,
    pub data: Vec<u8>,
}

#[derive(thiserror::Error, Debug)]
pub enum ArchiveError {
    #[error("transfer")]
    Transport(#[from] TransportError),
    #[error("malformed archive")]
    Decode(#[source] std::io::Error),
    #[error("failed to build archive")]
    Encode(#[source] std::io::Error),
    #[error("no entry named `{name}` in archive")]
    EntryNotFound { name: String },
    #[error("`{name}` is not a plain file name")]
    InvalidName { name: String },
}

fn now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// The entry is unpacked relative to the target directory, so anything with a
/// separator (or `.`/`..`) could land somewhere else
fn check_name(name: &str) -> Result<(), ArchiveError> {
    if name.is_empty() || name == "." || name == ".." || name.contains(['/', '\0']) {
        return Err(ArchiveError::InvalidName {
            name: name.to_string(),
        });
    }
    Ok(())
}

fn join(dir: &str, name: &str) -> String {
    format!("{}/{}", dir.trim_end_matches('/'), name)
}

/// Builds a tar stream holding exactly one regular file
pub fn build(meta: &FileMeta, data: &[u8]) -> Result<Vec<u8>, ArchiveError> {
    check_name(&meta.name)?;

    let mut header = meta.header(data.len() as u64)?;
    let mut builder = tar::Builder::new(Vec::new());
    builder
        .append_data(&mut header, &meta.name, data)
        .map_err(ArchiveError::Encode)?;

    builder.into_inner().map_err(ArchiveError::Encode)
}

/// Finds `name` in a tar stream and reads it fully
pub fn read_entry(archive: &[u8], name: &str) -> Result<Entry, ArchiveError> {
    let mut archive = tar::Archive::new(archive);

    for entry in archive.entries().map_err(ArchiveError::Decode)? {
        let mut entry = entry.map_err(ArchiveError::Decode)?;

        if entry.path().map_err(ArchiveError::Decode)? != Path::new(name) {
            continue;
        }

        let mut meta = FileMeta::from_header(name, entry.header())?;
        meta.apply_pax(&mut entry)?;
        let size = entry.size();

        let mut data = Vec::new();
        entry.read_to_end(&mut data).map_err(ArchiveError::Decode)?;

        // tar happily hands out a short read when the stream was cut off
        if data.len() as u64 != size {
            return Err(ArchiveError::Decode(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                format!("`{}` is {} bytes, archive holds {}", name, size, data.len()),
            )));
        }

        return Ok(Entry { meta, data });
    }

    Err(ArchiveError::EntryNotFound {
        name: name.to_string(),
    })
}

/// Creates (or replaces) `dir/<meta.name>` inside the container.
///
/// `dir` has to exist already. Failures from the runtime are passed back
/// untouched, nothing is retried.
pub fn write_file<T>(
    transport: &T,
    id: &str,
    dir: &str,
    meta: &FileMeta,
    payload: impl Into<Payload>,
) -> Result<(), ArchiveError>
where
    T: Transport + ?Sized,
{
    let payload: Payload = payload.into();
    let data = payload.into_bytes();
    info!(
        "writing {} ({} bytes, mode {:o}, {}:{})",
        join(dir, &meta.name),
        data.len(),
        meta.mode,
        meta.owner.uid,
        meta.owner.gid
    );

    let archive = build(meta, &data)?;
    transport.copy_in(id, dir, &archive)?;

    Ok(())
}

/// Adds `fragment` to the end of `dir/name`, which must already exist.
///
/// Mode and owner are carried over from the existing file, the mtime is
/// re-stamped. Not idempotent: appending the same fragment twice leaves it in
/// the file twice.
pub fn append_to_file<T>(
    transport: &T,
    id: &str,
    dir: &str,
    name: &str,
    fragment: impl Into<Payload>,
) -> Result<FileMeta, ArchiveError>
where
    T: Transport + ?Sized,
{
    check_name(name)?;

    let stream = transport.copy_out(id, &join(dir, name))?;
    let Entry {
        meta: old,
        mut data,
    } = read_entry(&stream, name)?;
    drop(stream);

    debug!("{} currently {} bytes", join(dir, name), data.len());
    let fragment: Payload = fragment.into();
    data.extend(fragment.into_bytes());

    let meta = FileMeta {
        name: old.name,
        mode: old.mode,
        mtime: now(),
        owner: old.owner,
    };
    write_file(transport, id, dir, &meta, data)?;

    Ok(meta)
}
