//! S3 storage backend.

use std::fs::File;
use std::io::{Read as _, Write};
use std::path::Path;

use bytes::Bytes;
use futures::{FutureExt, TryStreamExt};
use log::{debug, info};
use rusoto_core::credential::{AutoRefreshingProvider, ChainProvider, ProfileProvider};
use rusoto_core::{Client, HttpClient, Region, RusotoError};
use rusoto_s3::{
    AbortMultipartUploadRequest, CompleteMultipartUploadRequest, CompletedMultipartUpload,
    CompletedPart, CreateMultipartUploadRequest, DeleteObjectRequest, GetObjectError,
    GetObjectRequest, ListObjectsV2Output, ListObjectsV2Request, PutObjectRequest,
    S3Client as RusotoS3Client, StreamingBody, UploadPartRequest, S3,
};
use tokio::io::AsyncReadExt;
use tokio::runtime::{self, Runtime};

use crate::error::{OcflError, Result};
use crate::storage::{ByteRange, Listing, Storage};
use crate::util;

const MIN_PART_SIZE: u64 = 1024 * 1024 * 10;
const MAX_PART_SIZE: u64 = 1024 * 1024 * 100;
const MAX_PART_COUNT: u64 = 10_000;

/// Picks a part size for a multipart upload of `content_length` bytes such that the
/// upload never needs more than `MAX_PART_COUNT` parts, clamped to S3's allowed part
/// size range.
fn part_size_for(content_length: u64) -> u64 {
    let ideal = (content_length + MAX_PART_COUNT - 1) / MAX_PART_COUNT;
    ideal.clamp(MIN_PART_SIZE, MAX_PART_SIZE)
}

/// Storage backed by an S3 bucket. Every key is rooted under an optional
/// fixed prefix, so callers only ever deal in paths relative to the
/// storage root.
pub struct S3Storage {
    s3_client: RusotoS3Client,
    bucket: String,
    prefix: String,
    runtime: Runtime,
}

struct ListResult {
    objects: Vec<String>,
    directories: Vec<String>,
}

impl S3Storage {
    pub fn new(region: Region, bucket: &str, prefix: Option<&str>, profile: Option<&str>) -> Result<Self> {
        Ok(Self {
            s3_client: create_rusoto_client(region, profile),
            bucket: bucket.to_owned(),
            prefix: prefix.map(|p| p.trim_matches('/')).unwrap_or_default().to_owned(),
            runtime: runtime::Builder::new_multi_thread().enable_all().build()?,
        })
    }

    fn key(&self, path: &str) -> String {
        crate::paths::join(&self.prefix, path)
    }

    fn list_prefix(&self, path: &str, delimiter: Option<String>) -> Result<ListResult> {
        let prefix = crate::paths::join_with_trailing_slash(&self.prefix, path);

        info!("Listing S3 prefix: {}", prefix);

        let mut objects = Vec::new();
        let mut directories = Vec::new();
        let mut continuation = None;

        let prefix_offset = if self.prefix.is_empty() {
            0
        } else {
            self.prefix.len() + 1
        };

        loop {
            let result: ListObjectsV2Output =
                self.runtime.block_on(self.s3_client.list_objects_v2(ListObjectsV2Request {
                    bucket: self.bucket.clone(),
                    prefix: Some(prefix.clone()),
                    delimiter: delimiter.clone(),
                    continuation_token: continuation.clone(),
                    ..Default::default()
                }))?;

            if let Some(contents) = &result.contents {
                for object in contents {
                    objects.push(object.key.as_ref().unwrap()[prefix_offset..].to_owned());
                }
            }

            if let Some(prefixes) = &result.common_prefixes {
                for prefix in prefixes {
                    let full = prefix.prefix.as_ref().unwrap();
                    let length = full.len() - 1;
                    directories.push(full[prefix_offset..length].to_owned());
                }
            }

            if result.is_truncated.unwrap_or(false) {
                continuation = result.next_continuation_token.clone();
            } else {
                break;
            }
        }

        Ok(ListResult { objects, directories })
    }

    fn get_object(&self, path: &str) -> Result<Option<Vec<u8>>> {
        let key = self.key(path);

        let result = self.runtime.block_on(self.s3_client.get_object(GetObjectRequest {
            bucket: self.bucket.clone(),
            key,
            ..Default::default()
        }));

        match result {
            Ok(result) => self.runtime.block_on(async move {
                let mut buffer = Vec::new();
                result.body.unwrap().into_async_read().read_to_end(&mut buffer).await?;
                Ok(Some(buffer))
            }),
            Err(RusotoError::Service(GetObjectError::NoSuchKey(_))) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn stream_object(&self, path: &str, range: Option<ByteRange>, sink: &mut dyn Write) -> Result<()> {
        let key = self.key(path);

        info!("Streaming object from S3: {}", key);

        let range_header = range.map(|r| format!("bytes={}-{}", r.start, r.end.saturating_sub(1)));

        let result = self.runtime.block_on(self.s3_client.get_object(GetObjectRequest {
            bucket: self.bucket.clone(),
            key,
            range: range_header,
            ..Default::default()
        }));

        match result {
            Ok(result) => self.runtime.block_on(async move {
                let mut reader = result.body.unwrap().into_async_read();
                let mut buf = [0; 8192];
                loop {
                    let read = reader.read(&mut buf).await?;
                    if read == 0 {
                        break;
                    }
                    sink.write_all(&buf[..read])?;
                }
                Ok(())
            }),
            Err(RusotoError::Service(GetObjectError::NoSuchKey(_))) => Err(OcflError::NotFound(path.to_string())),
            Err(e) => Err(e.into()),
        }
    }

    fn delete_object(&self, path: &str) -> Result<()> {
        let key = self.key(path);

        self.runtime.block_on(self.s3_client.delete_object(DeleteObjectRequest {
            bucket: self.bucket.clone(),
            key,
            ..Default::default()
        }))?;

        Ok(())
    }

    fn put_object_bytes(&self, path: &str, content: Bytes, content_type: Option<&str>, overwrite: bool) -> Result<()> {
        if !overwrite && self.object_exists(path)? {
            return Err(OcflError::AlreadyExists(path.to_string()));
        }

        let key = self.key(path);

        self.runtime.block_on(self.s3_client.put_object(PutObjectRequest {
            key,
            bucket: self.bucket.clone(),
            content_length: Some(content.len() as i64),
            body: Some(StreamingBody::new(futures::stream::once(async move { Ok(content) }))),
            content_type: content_type.map(|s| s.to_string()),
            ..Default::default()
        }))?;

        Ok(())
    }

    fn object_exists(&self, path: &str) -> Result<bool> {
        Ok(self.get_object(path)?.is_some())
    }

    fn put_object_file(&self, path: &str, file_path: impl AsRef<Path>, content_type: Option<&str>, overwrite: bool) -> Result<()> {
        if !overwrite && self.object_exists(path)? {
            return Err(OcflError::AlreadyExists(path.to_string()));
        }

        let content_length = std::fs::metadata(&file_path)?.len();

        if content_length > MIN_PART_SIZE {
            self.multipart_put_file(path, file_path, content_length, content_type)
        } else {
            let key = self.key(path);
            info!("Putting {} in S3 at {}", file_path.as_ref().to_string_lossy(), key);

            let stream = tokio::fs::read(file_path.as_ref().to_path_buf())
                .into_stream()
                .map_ok(Bytes::from);

            self.runtime.block_on(self.s3_client.put_object(PutObjectRequest {
                key,
                bucket: self.bucket.clone(),
                content_length: Some(content_length as i64),
                body: Some(StreamingBody::new(stream)),
                content_type: content_type.map(|s| s.to_string()),
                ..Default::default()
            }))?;

            Ok(())
        }
    }

    fn multipart_put_file(
        &self,
        path: &str,
        file_path: impl AsRef<Path>,
        content_length: u64,
        content_type: Option<&str>,
    ) -> Result<()> {
        let key = self.key(path);
        let part_size = part_size_for(content_length);

        info!(
            "Initiating S3 multipart upload of {} to {} in {} byte parts",
            file_path.as_ref().to_string_lossy(),
            key,
            part_size
        );

        let mut i = 1;
        let mut reader = File::open(file_path)?;
        let mut buffer = vec![0u8; part_size as usize];
        let mut parts = Vec::with_capacity(((content_length / part_size) + 1) as usize);

        let upload_id = self
            .runtime
            .block_on(self.s3_client.create_multipart_upload(CreateMultipartUploadRequest {
                bucket: self.bucket.clone(),
                content_type: content_type.map(|s| s.to_string()),
                key: key.clone(),
                ..Default::default()
            }))?
            .upload_id
            .unwrap();

        let create_upload_part = |content: Vec<u8>, part_number: i64| -> UploadPartRequest {
            UploadPartRequest {
                upload_id: upload_id.clone(),
                part_number,
                bucket: self.bucket.clone(),
                key: key.clone(),
                body: Some(content.into()),
                ..Default::default()
            }
        };

        loop {
            let read = match reader.read(&mut buffer) {
                Ok(read) => read,
                Err(e) => {
                    self.abort_multipart(&key, &upload_id);
                    return Err(e.into());
                }
            };

            if read == 0 {
                break;
            }

            debug!("Upload part {} for {}", i, read);

            let e_tag = match self
                .runtime
                .block_on(self.s3_client.upload_part(create_upload_part(buffer[..read].to_vec(), i)))
            {
                Ok(result) => result.e_tag,
                Err(e) => {
                    self.abort_multipart(&key, &upload_id);
                    return Err(e.into());
                }
            };

            parts.push(CompletedPart {
                e_tag,
                part_number: Some(i),
            });

            i += 1;
        }

        self.runtime.block_on(self.s3_client.complete_multipart_upload(CompleteMultipartUploadRequest {
            bucket: self.bucket.clone(),
            key: key.clone(),
            multipart_upload: Some(CompletedMultipartUpload { parts: Some(parts) }),
            upload_id,
            ..Default::default()
        }))?;

        Ok(())
    }

    fn abort_multipart(&self, key: &str, upload_id: &str) {
        info!("Aborting multipart upload to {}", key);
        if let Err(e) = self.runtime.block_on(self.s3_client.abort_multipart_upload(AbortMultipartUploadRequest {
            bucket: self.bucket.clone(),
            key: key.to_string(),
            upload_id: upload_id.to_string(),
            ..Default::default()
        })) {
            log::error!("Failed to abort multipart upload to {}: {}", key, e);
        }
    }
}

impl Storage for S3Storage {
    fn read(&self, path: &str, sink: &mut dyn Write) -> Result<()> {
        self.stream_object(path, None, sink)
    }

    fn read_range(&self, path: &str, range: ByteRange, sink: &mut dyn Write) -> Result<()> {
        self.stream_object(path, Some(range), sink)
    }

    fn write(&self, path: &str, bytes: &[u8], media_type: Option<&str>, overwrite: bool) -> Result<()> {
        self.put_object_bytes(path, Bytes::copy_from_slice(bytes), media_type, overwrite)
    }

    fn write_file(&self, path: &str, src: &Path, media_type: Option<&str>, overwrite: bool) -> Result<()> {
        self.put_object_file(path, src, media_type, overwrite)
    }

    fn copy_file_internal(&self, src: &str, dst: &str) -> Result<()> {
        let bytes = self.get_object(src)?.ok_or_else(|| OcflError::NotFound(src.to_string()))?;
        self.put_object_bytes(dst, Bytes::from(bytes), None, true)
    }

    fn copy_file_into(&self, src: &Path, dst: &str, media_type: Option<&str>) -> Result<()> {
        self.put_object_file(dst, src, media_type, true)
    }

    fn copy_directory_out_of(&self, src: &str, dst: &Path) -> Result<()> {
        for key in self.list_prefix(src, None)?.objects {
            let relative = &key[src.trim_end_matches('/').len().min(key.len())..];
            let relative = relative.trim_start_matches('/');
            let dest_path = dst.join(relative);
            if let Some(parent) = dest_path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let bytes = self.get_object(&crate::paths::join(src, relative))?.unwrap_or_default();
            std::fs::write(&dest_path, bytes)?;
        }
        Ok(())
    }

    fn move_directory_into(&self, src: &Path, dst: &str, overwrite: bool) -> Result<()> {
        for entry in walkdir::WalkDir::new(src) {
            let entry = entry?;
            if entry.file_type().is_dir() {
                continue;
            }
            let relative = pathdiff::diff_paths(entry.path(), src).unwrap();
            let relative = util::convert_backslash_to_forward(&relative.to_string_lossy().to_string()).into_owned();
            let key = crate::paths::join(dst, &relative);
            self.put_object_file(&key, entry.path(), None, overwrite)?;
        }
        std::fs::remove_dir_all(src)?;
        Ok(())
    }

    fn move_directory_internal(&self, src: &str, dst: &str) -> Result<()> {
        for key in self.list_prefix(src, None)?.objects {
            let relative = key[src.trim_end_matches('/').len().min(key.len())..].trim_start_matches('/');
            let dest_key = crate::paths::join(dst, relative);
            self.copy_file_internal(&key, &dest_key)?;
            self.delete_object(&key)?;
        }
        Ok(())
    }

    fn list_directory(&self, prefix: &str) -> Result<Vec<Listing>> {
        self.list(prefix, false)
    }

    fn list_recursive(&self, prefix: &str) -> Result<Vec<Listing>> {
        self.list(prefix, true)
    }

    fn file_exists(&self, path: &str) -> Result<bool> {
        self.object_exists(path)
    }

    fn directory_exists(&self, path: &str) -> Result<bool> {
        Ok(!self.list_prefix(path, Some("/".to_string()))?.is_empty())
    }

    fn delete_file(&self, path: &str) -> Result<()> {
        self.delete_object(path)
    }

    fn delete_directory(&self, path: &str) -> Result<()> {
        for key in self.list_prefix(path, None)?.objects {
            self.delete_object(&key)?;
        }
        Ok(())
    }

    fn delete_empty_dirs_up(&self, _path: &str) -> Result<()> {
        // S3 has no directory concept; "directories" only exist as key prefixes
        // and disappear automatically once their last object is deleted.
        Ok(())
    }

    fn delete_empty_dirs_down(&self, _path: &str) -> Result<()> {
        Ok(())
    }

    fn create_directories(&self, _path: &str) -> Result<()> {
        Ok(())
    }

    fn iterate_object_roots<'a>(&'a self) -> Result<Box<dyn Iterator<Item = Result<String>> + 'a>> {
        Ok(Box::new(S3ObjectRootIter::new(self)))
    }
}

impl S3Storage {
    fn list(&self, path: &str, recursive: bool) -> Result<Vec<Listing>> {
        let prefix_len = if path.is_empty() || path.ends_with('/') {
            path.len()
        } else {
            path.len() + 1
        };

        if recursive {
            Ok(self
                .list_prefix(path, None)?
                .objects
                .into_iter()
                .map(|entry| Listing::file_owned(entry[prefix_len..].to_string()))
                .collect())
        } else {
            let result = self.list_prefix(path, Some("/".to_string()))?;
            let mut listings = Vec::with_capacity(result.objects.len() + result.directories.len());

            for entry in result.objects {
                listings.push(Listing::file_owned(entry[prefix_len..].to_string()));
            }
            for entry in result.directories {
                listings.push(Listing::dir_owned(entry[prefix_len..].to_string()));
            }

            Ok(listings)
        }
    }
}

impl ListResult {
    fn is_empty(&self) -> bool {
        self.objects.is_empty() && self.directories.is_empty()
    }
}

/// Walks S3 "directories" (common prefixes) looking for object roots,
/// mirroring the restartable depth-first walk used by the filesystem
/// backend, but driven by repeated `ListObjectsV2` delimiter queries
/// instead of a native directory iterator.
struct S3ObjectRootIter<'a> {
    storage: &'a S3Storage,
    dir_stack: Vec<std::vec::IntoIter<String>>,
    current: Option<std::vec::IntoIter<String>>,
}

impl<'a> S3ObjectRootIter<'a> {
    fn new(storage: &'a S3Storage) -> Self {
        Self {
            storage,
            dir_stack: vec![vec![String::new()].into_iter()],
            current: None,
        }
    }
}

impl<'a> Iterator for S3ObjectRootIter<'a> {
    type Item = Result<String>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.current.is_none() {
                self.current = self.dir_stack.pop();
                if self.current.is_none() {
                    return None;
                }
            }

            let next_dir = self.current.as_mut().unwrap().next();

            match next_dir {
                None => {
                    self.current = None;
                }
                Some(dir) => {
                    if dir.ends_with(crate::consts::EXTENSIONS_DIR) {
                        continue;
                    }

                    let marker_prefix = crate::paths::join(&dir, crate::consts::OBJECT_NAMASTE_FILE_PREFIX);
                    let is_root = match self.storage.list_prefix(&marker_prefix, None) {
                        Ok(result) => !result.objects.is_empty(),
                        Err(e) => return Some(Err(e)),
                    };

                    if is_root {
                        return Some(Ok(dir));
                    }

                    match self.storage.list_prefix(&dir, Some("/".to_string())) {
                        Ok(result) => {
                            self.dir_stack.push(self.current.take().unwrap());
                            self.current = Some(result.directories.into_iter());
                        }
                        Err(e) => return Some(Err(e)),
                    }
                }
            }
        }
    }
}

fn create_rusoto_client(region: Region, profile: Option<&str>) -> RusotoS3Client {
    match profile {
        Some(profile) => {
            let credentials_provider = AutoRefreshingProvider::new(ChainProvider::with_profile_provider(
                ProfileProvider::with_default_credentials(profile).expect("failed to create profile provider"),
            ))
            .expect("failed to create credentials provider");
            let dispatcher = HttpClient::new().expect("failed to create request dispatcher");
            let client = Client::new_with(credentials_provider, dispatcher);
            RusotoS3Client::new_with_client(client, region)
        }
        None => RusotoS3Client::new(region),
    }
}
