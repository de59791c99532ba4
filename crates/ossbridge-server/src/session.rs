//! One SFTP protocol session over an SSH channel.
//!
//! Translates protocol requests into [`FsHandler`] operations and maps
//! [`FsError`] variants onto protocol status codes. Handles are plain
//! counters; each one owns its reader snapshot, write handle or directory
//! batch.

use std::collections::HashMap;
use std::sync::Arc;

use ossbridge_core::{Entry, FileWriter, FsError, FsHandler, ObjectReader};
use russh_sftp::protocol::{
    Attrs, Data, File, FileAttributes, Handle, Name, OpenFlags, Status, StatusCode, Version,
};
use tracing::{debug, error, warn};

const SYMLINK_MODE: u32 = 0o120777;
const DIR_MODE: u32 = 0o40755;
const FILE_MODE: u32 = 0o100644;

pub struct SftpSession {
    fs: Arc<FsHandler>,
    version: Option<u32>,
    handles: HashMap<String, HandleState>,
    next_handle: u64,
}

enum HandleState {
    Read(ObjectReader),
    Write(FileWriter),
    Dir { files: Vec<File>, done: bool },
}

/// Resolve `.` and `..` segments against an absolute path.
fn canonicalize(path: &str) -> String {
    let mut parts: Vec<&str> = Vec::new();
    for part in path.split('/') {
        match part {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            p => parts.push(p),
        }
    }
    if parts.is_empty() {
        "/".to_string()
    } else {
        format!("/{}", parts.join("/"))
    }
}

fn attrs_for(entry: &Entry) -> FileAttributes {
    let permissions = if entry.symlink.is_some() {
        SYMLINK_MODE
    } else if entry.is_dir {
        DIR_MODE
    } else {
        FILE_MODE
    };
    let mtime = entry.modified.timestamp().max(0) as u32;
    FileAttributes {
        size: Some(entry.size),
        permissions: Some(permissions),
        atime: Some(mtime),
        mtime: Some(mtime),
        ..Default::default()
    }
}

fn ok_status(id: u32) -> Status {
    Status {
        id,
        status_code: StatusCode::Ok,
        error_message: "Ok".to_string(),
        language_tag: "en-US".to_string(),
    }
}

/// Protocol status for a failed operation. Backend detail stays in the
/// log; the client only sees a generic failure.
fn status_for(err: FsError) -> StatusCode {
    match err {
        FsError::NotFound(path) => {
            debug!(%path, "not found");
            StatusCode::NoSuchFile
        }
        FsError::Protocol(msg) => {
            debug!(%msg, "unsupported request");
            StatusCode::OpUnsupported
        }
        FsError::AlreadyExists(path) => {
            debug!(%path, "already exists");
            StatusCode::Failure
        }
        FsError::InvalidOperation(path) => {
            debug!(%path, "invalid operation");
            StatusCode::Failure
        }
        FsError::Backend(err) => {
            error!(error = %err, "object store failure");
            StatusCode::Failure
        }
    }
}

impl SftpSession {
    pub fn new(fs: Arc<FsHandler>) -> Self {
        Self {
            fs,
            version: None,
            handles: HashMap::new(),
            next_handle: 0,
        }
    }

    fn register(&mut self, state: HandleState) -> String {
        self.next_handle += 1;
        let handle = format!("h{}", self.next_handle);
        self.handles.insert(handle.clone(), state);
        handle
    }
}

impl russh_sftp::server::Handler for SftpSession {
    type Error = StatusCode;

    fn unimplemented(&self) -> Self::Error {
        StatusCode::OpUnsupported
    }

    async fn init(
        &mut self,
        version: u32,
        extensions: HashMap<String, String>,
    ) -> Result<Version, Self::Error> {
        if self.version.is_some() {
            error!("duplicate init packet");
            return Err(StatusCode::ConnectionLost);
        }
        self.version = Some(version);
        debug!(%version, ?extensions, "session initialized");
        Ok(Version::new())
    }

    async fn open(
        &mut self,
        id: u32,
        filename: String,
        pflags: OpenFlags,
        _attrs: FileAttributes,
    ) -> Result<Handle, Self::Error> {
        let path = canonicalize(&filename);
        let state = if pflags.intersects(OpenFlags::WRITE | OpenFlags::CREATE | OpenFlags::APPEND) {
            HandleState::Write(self.fs.open_write(&path).await.map_err(status_for)?)
        } else {
            HandleState::Read(self.fs.open_read(&path).await.map_err(status_for)?)
        };
        Ok(Handle {
            id,
            handle: self.register(state),
        })
    }

    async fn close(&mut self, id: u32, handle: String) -> Result<Status, Self::Error> {
        match self.handles.remove(&handle) {
            Some(HandleState::Write(writer)) => {
                self.fs.close_write(writer.path()).await;
                Ok(ok_status(id))
            }
            Some(_) => Ok(ok_status(id)),
            None => {
                warn!(%handle, "close of unknown handle");
                Err(StatusCode::Failure)
            }
        }
    }

    async fn read(
        &mut self,
        id: u32,
        handle: String,
        offset: u64,
        len: u32,
    ) -> Result<Data, Self::Error> {
        match self.handles.get(&handle) {
            Some(HandleState::Read(reader)) => {
                let slice = reader.read_at(offset, len);
                if slice.is_empty() && len > 0 {
                    return Err(StatusCode::Eof);
                }
                Ok(Data {
                    id,
                    data: slice.to_vec(),
                })
            }
            _ => Err(StatusCode::Failure),
        }
    }

    async fn write(
        &mut self,
        id: u32,
        handle: String,
        offset: u64,
        data: Vec<u8>,
    ) -> Result<Status, Self::Error> {
        match self.handles.get(&handle) {
            Some(HandleState::Write(writer)) => {
                writer.write_at(offset, &data).await.map_err(status_for)?;
                Ok(ok_status(id))
            }
            _ => Err(StatusCode::Failure),
        }
    }

    async fn lstat(&mut self, id: u32, path: String) -> Result<Attrs, Self::Error> {
        let entry = self
            .fs
            .stat(&canonicalize(&path))
            .await
            .map_err(status_for)?;
        Ok(Attrs {
            id,
            attrs: attrs_for(&entry),
        })
    }

    async fn fstat(&mut self, id: u32, handle: String) -> Result<Attrs, Self::Error> {
        let attrs = match self.handles.get(&handle) {
            Some(HandleState::Read(reader)) => FileAttributes {
                size: Some(reader.len()),
                permissions: Some(FILE_MODE),
                ..Default::default()
            },
            Some(HandleState::Write(writer)) => FileAttributes {
                size: Some(writer.len().await),
                permissions: Some(FILE_MODE),
                ..Default::default()
            },
            Some(HandleState::Dir { .. }) => FileAttributes {
                size: Some(0),
                permissions: Some(DIR_MODE),
                ..Default::default()
            },
            None => return Err(StatusCode::Failure),
        };
        Ok(Attrs { id, attrs })
    }

    async fn setstat(
        &mut self,
        id: u32,
        path: String,
        _attrs: FileAttributes,
    ) -> Result<Status, Self::Error> {
        self.fs
            .setstat(&canonicalize(&path))
            .await
            .map_err(status_for)?;
        Ok(ok_status(id))
    }

    async fn fsetstat(
        &mut self,
        id: u32,
        handle: String,
        _attrs: FileAttributes,
    ) -> Result<Status, Self::Error> {
        if self.handles.contains_key(&handle) {
            Ok(ok_status(id))
        } else {
            Err(StatusCode::Failure)
        }
    }

    async fn opendir(&mut self, id: u32, path: String) -> Result<Handle, Self::Error> {
        let children = self
            .fs
            .list(&canonicalize(&path))
            .await
            .map_err(status_for)?;
        let files = children
            .iter()
            .map(|entry| File::new(entry.name.clone(), attrs_for(entry)))
            .collect();
        Ok(Handle {
            id,
            handle: self.register(HandleState::Dir { files, done: false }),
        })
    }

    async fn readdir(&mut self, id: u32, handle: String) -> Result<Name, Self::Error> {
        match self.handles.get_mut(&handle) {
            Some(HandleState::Dir { files, done }) => {
                if *done {
                    return Err(StatusCode::Eof);
                }
                *done = true;
                Ok(Name {
                    id,
                    files: std::mem::take(files),
                })
            }
            _ => Err(StatusCode::Failure),
        }
    }

    async fn remove(&mut self, id: u32, filename: String) -> Result<Status, Self::Error> {
        self.fs
            .remove(&canonicalize(&filename))
            .await
            .map_err(status_for)?;
        Ok(ok_status(id))
    }

    async fn mkdir(
        &mut self,
        id: u32,
        path: String,
        _attrs: FileAttributes,
    ) -> Result<Status, Self::Error> {
        self.fs
            .mkdir(&canonicalize(&path))
            .await
            .map_err(status_for)?;
        Ok(ok_status(id))
    }

    async fn rmdir(&mut self, id: u32, path: String) -> Result<Status, Self::Error> {
        self.fs
            .remove(&canonicalize(&path))
            .await
            .map_err(status_for)?;
        Ok(ok_status(id))
    }

    async fn realpath(&mut self, id: u32, path: String) -> Result<Name, Self::Error> {
        Ok(Name {
            id,
            files: vec![File::dummy(canonicalize(&path))],
        })
    }

    async fn stat(&mut self, id: u32, path: String) -> Result<Attrs, Self::Error> {
        let mut entry = self
            .fs
            .stat(&canonicalize(&path))
            .await
            .map_err(status_for)?;
        // follow a link one hop so clients see the target's attributes
        if let Some(target) = entry.symlink.clone() {
            entry = self.fs.stat(&target).await.map_err(status_for)?;
        }
        Ok(Attrs {
            id,
            attrs: attrs_for(&entry),
        })
    }

    async fn rename(
        &mut self,
        id: u32,
        oldpath: String,
        newpath: String,
    ) -> Result<Status, Self::Error> {
        self.fs
            .rename(&canonicalize(&oldpath), &canonicalize(&newpath))
            .await
            .map_err(status_for)?;
        Ok(ok_status(id))
    }

    async fn readlink(&mut self, id: u32, path: String) -> Result<Name, Self::Error> {
        let target = self
            .fs
            .readlink(&canonicalize(&path))
            .await
            .map_err(status_for)?;
        Ok(Name {
            id,
            files: vec![File::dummy(target)],
        })
    }

    async fn symlink(
        &mut self,
        id: u32,
        linkpath: String,
        targetpath: String,
    ) -> Result<Status, Self::Error> {
        self.fs
            .symlink(&targetpath, &linkpath)
            .await
            .map_err(status_for)?;
        Ok(ok_status(id))
    }
}
