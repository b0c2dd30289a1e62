use bollard::container::{DownloadFromContainerOptions, UploadToContainerOptions};
use futures::TryStreamExt;
use tracing::debug;

use super::{Transport, TransportError};

/// Copies files over the engine api socket instead of spawning the cli
pub struct Engine {
    docker: bollard::Docker,
    rt: tokio::runtime::Runtime,
}

impl Engine {
    pub fn connect() -> Result<Self, TransportError> {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;

        // the client registers its connector with the reactor, so build it inside
        let docker = rt.block_on(async { bollard::Docker::connect_with_local_defaults() })?;

        Ok(Engine { docker, rt })
    }
}

impl Transport for Engine {
    fn copy_out(&self, id: &str, path: &str) -> Result<Vec<u8>, TransportError> {
        debug!("download {}:{}", id, path);

        let chunks = self.rt.block_on(
            self.docker
                .download_from_container(
                    id,
                    Some(DownloadFromContainerOptions {
                        path: path.to_string(),
                    }),
                )
                .try_collect::<Vec<_>>(),
        )?;

        Ok(chunks.into_iter().flatten().collect())
    }

    fn copy_in(&self, id: &str, dir: &str, archive: &[u8]) -> Result<(), TransportError> {
        debug!("upload {} bytes to {}:{}", archive.len(), id, dir);

        self.rt.block_on(self.docker.upload_to_container(
            id,
            Some(UploadToContainerOptions {
                path: dir.to_string(),
                ..Default::default()
            }),
            archive.to_vec().into(),
        ))?;

        Ok(())
    }
}
