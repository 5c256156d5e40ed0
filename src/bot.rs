//! Command handling: resolves links, runs a pipeline step, publishes the
//! result and reports back to the requester.

use std::path::{Path, PathBuf};

use log::{info, warn};
use serde::Serialize;
use serde_json::json;

use crate::command::{guess_path, safe_string, Bucket, Command};
use crate::config::Config;
use crate::cutout::slices::{find_slice_extension, probe_layer_kind};
use crate::cutout::{
    create_cutouts, locate_metadata, new_layer_info, upload_cutout, CutoutReport, LocatedCutout,
    SliceVoxel, UploadReport,
};
use crate::error::GtbotError;
use crate::notify::Notifier;
use crate::payload::{
    inline_link, share_link, AnnotationPayload, IdGenerator, Layer, PayloadStore, ViewerLink,
    VolumeLayer,
};
use crate::translate::{translate, TranslationReport};
use crate::volume::{LayerKind, PrecomputedOpener, PrecomputedSource, SourceOpener};

/// Slice extensions tried after the configured one.
const FALLBACK_EXTENSIONS: [&str; 2] = ["tif", "png"];

/// Result of `create bboxes`.
#[derive(Clone, Debug, Serialize)]
pub struct BboxOutcome {
    pub link: String,
    pub report: TranslationReport,
}

/// Result of `upload` / `save`.
#[derive(Clone, Debug, Serialize)]
pub struct UploadOutcome {
    pub link: String,
    pub report: UploadReport,
}

/// Result of one handled chat message.
#[derive(Clone, Debug, Serialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum Outcome {
    Bboxes(BboxOutcome),
    Cutouts { reports: Vec<CutoutReport> },
    Upload(UploadOutcome),
}

/// Everything a command needs from the outside world.
pub struct Bot {
    config: Config,
    opener: Box<dyn SourceOpener>,
    destinations: PrecomputedOpener,
    store: Box<dyn PayloadStore>,
    notifier: Box<dyn Notifier>,
    ids: IdGenerator,
}

impl Bot {
    pub fn new(
        config: Config,
        opener: Box<dyn SourceOpener>,
        store: Box<dyn PayloadStore>,
        notifier: Box<dyn Notifier>,
    ) -> Self {
        let ids = IdGenerator::new(config.seed);
        let destinations = PrecomputedOpener::new(None, config.timeout());
        Self {
            config,
            opener,
            destinations,
            store,
            notifier,
            ids,
        }
    }

    /// Replaces the opener used for new upload layers.
    pub fn with_destinations(mut self, destinations: PrecomputedOpener) -> Self {
        self.destinations = destinations;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Parses `message` and runs the command it names.
    pub fn handle(
        &mut self,
        message: &str,
        bot_id: Option<&str>,
        author: &str,
    ) -> Result<Outcome, GtbotError> {
        match Command::parse(message, bot_id)? {
            Command::CreateBboxes { link } => self.create_bboxes(&link, author).map(Outcome::Bboxes),
            Command::CreateCutouts { link } => self
                .create_cutouts(&link, author)
                .map(|reports| Outcome::Cutouts { reports }),
            Command::Upload { path, bucket } => {
                self.upload(&path, bucket, author).map(Outcome::Upload)
            }
        }
    }

    /// Loads the payload behind a viewer link.
    pub fn resolve(&self, link: &str) -> Result<AnnotationPayload, GtbotError> {
        ViewerLink::parse(link)?.into_payload(self.store.as_ref())
    }

    /// Stores `payload` and returns a short link to it, or an inline link
    /// when the store cannot be reached.
    pub fn publish(&self, payload: &AnnotationPayload) -> Result<String, GtbotError> {
        let host = &self.config.viewer.host;
        match self.store.put(payload) {
            Ok(token) => Ok(share_link(host, &token)),
            Err(e) => {
                warn!("falling back to an inline link: {}", e);
                inline_link(host, payload)
            }
        }
    }

    /// Expands the point annotations of `link` into boxes.
    pub fn create_bboxes(&mut self, link: &str, author: &str) -> Result<BboxOutcome, GtbotError> {
        self.notifier
            .notify(author, "Convert point annotations to bboxes");
        let payload = self.resolve(link)?;
        let (translated, report) =
            translate(&payload, &self.config, self.opener.as_ref(), &mut self.ids)?;
        let link = self.publish(&translated)?;
        self.notifier
            .notify(author, &format!("{}{}", report, link));
        Ok(BboxOutcome { link, report })
    }

    /// Writes one slice directory per box annotation of `link`.
    pub fn create_cutouts(
        &mut self,
        link: &str,
        author: &str,
    ) -> Result<Vec<CutoutReport>, GtbotError> {
        self.notifier
            .notify(author, "Creating cutouts for ground truthing");
        let payload = self.resolve(link)?;
        let reports = create_cutouts(
            &payload,
            self.opener.as_ref(),
            &self.config,
            author,
            &mut self.ids,
            self.notifier.as_ref(),
        )?;
        if reports.is_empty() {
            self.notifier
                .notify(author, "No bounding boxes found in the link");
        }
        Ok(reports)
    }

    /// Uploads the cutout at `path` into a new layer under `bucket`.
    pub fn upload(
        &mut self,
        path: &str,
        bucket: Bucket,
        author: &str,
    ) -> Result<UploadOutcome, GtbotError> {
        let local = self.local_path(path)?;
        self.notifier
            .notify(author, &format!("Start uploading dataset: {}", path));

        let located = locate_metadata(&local)?;
        let extension = self.slice_extension(&located.slice_dir)?;
        let kind = probe_layer_kind(&located.slice_dir, &extension)?;

        let bucket_name = match bucket {
            Bucket::Scratch => &self.config.upload.bucket,
            Bucket::Permanent => &self.config.upload.save_bucket,
        };
        let owner = match safe_string(author).replace(' ', "_") {
            s if s.is_empty() => self.config.upload.default_author.clone(),
            s => s,
        };
        let destination = format!(
            "{}{}/{}/{}",
            self.config.upload.store_root,
            bucket_name,
            owner,
            self.ids.tag()
        );

        let report = match kind {
            LayerKind::Image => self.upload_as::<u8>(&located, &extension, &destination)?,
            LayerKind::Segmentation => self.upload_as::<u32>(&located, &extension, &destination)?,
        };
        self.notifier.notify(author, &report.to_string());

        let payload = self.preview_payload(&located, kind, &destination)?;
        let link = self.publish(&payload)?;
        self.notifier
            .notify(author, &format!("neuroglancer link: {}", link));
        Ok(UploadOutcome { link, report })
    }

    fn upload_as<T: SliceVoxel>(
        &self,
        located: &LocatedCutout,
        extension: &str,
        destination: &str,
    ) -> Result<UploadReport, GtbotError> {
        let region = located.metadata.region(&located.metadata_path)?;
        let info = new_layer_info(T::KIND, &region, located.metadata.raw.mip, &self.config.upload);
        let store = self.destinations.store(destination)?;
        let mut layer = PrecomputedSource::<T>::create(store, info)?;
        info!("created layer {}", destination);
        upload_cutout(located, extension, &mut layer)
    }

    /// A payload showing the source image next to a freshly uploaded layer.
    fn preview_payload(
        &self,
        located: &LocatedCutout,
        kind: LayerKind,
        destination: &str,
    ) -> Result<AnnotationPayload, GtbotError> {
        let region = located.metadata.region(&located.metadata_path)?;
        let image = VolumeLayer::new(
            "img",
            format!("precomputed://{}", located.metadata.raw.src_path),
        );
        let source = format!("precomputed://{}", destination);
        let uploaded = match kind {
            LayerKind::Image => Layer::Image(VolumeLayer::new("uploaded_image", source)),
            LayerKind::Segmentation => Layer::Segmentation(VolumeLayer::new("seg", source)),
        };

        let mut payload = AnnotationPayload {
            layers: vec![Layer::Image(image), uploaded],
            navigation: Some(json!({
                "pose": {
                    "position": {
                        "voxelSize": self.config.viewer.voxel_size,
                        "voxelCoordinates": region.center(),
                    }
                },
                "zoomFactor": 4,
            })),
            ..Default::default()
        };
        payload.extra.insert("showSlices".to_string(), json!(false));
        payload.extra.insert("layout".to_string(), json!("xy-3d"));
        Ok(payload)
    }

    fn local_path(&self, path: &str) -> Result<PathBuf, GtbotError> {
        let direct = Path::new(path);
        if direct.exists() {
            return Ok(direct.to_path_buf());
        }
        self.config
            .upload
            .workspace_prefix
            .as_deref()
            .and_then(|prefix| guess_path(path, prefix))
            .ok_or_else(|| {
                GtbotError::Io(std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    format!("Cannot find the path: {}", path),
                ))
            })
    }

    fn slice_extension(&self, dir: &Path) -> Result<String, GtbotError> {
        let mut candidates = vec![self.config.cutout.extension.as_str()];
        candidates.extend(FALLBACK_EXTENSIONS);
        find_slice_extension(dir, &candidates)?
            .map(str::to_string)
            .ok_or_else(|| GtbotError::NoSlices {
                path: dir.to_path_buf(),
                extension: candidates.join("|"),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Stage;
    use crate::notify::MemoryNotifier;
    use crate::payload::{payload_from_json_str, MemoryPayloadStore};
    use crate::volume::MemoryOpener;

    struct OfflineStore;

    impl PayloadStore for OfflineStore {
        fn put(&self, _payload: &AnnotationPayload) -> Result<String, GtbotError> {
            Err(GtbotError::unavailable(Stage::PayloadStore, "state", "offline"))
        }

        fn get(&self, token: &str) -> Result<AnnotationPayload, GtbotError> {
            Err(GtbotError::unavailable(Stage::PayloadStore, token, "offline"))
        }
    }

    fn bot(store: Box<dyn PayloadStore>) -> Bot {
        let mut config = Config::default();
        config.viewer.host = "https://viewer.example".to_string();
        config.seed = Some(3);
        Bot::new(
            config,
            Box::new(MemoryOpener::new()),
            store,
            Box::new(MemoryNotifier::new()),
        )
    }

    fn payload() -> AnnotationPayload {
        payload_from_json_str(
            r#"{"layers": [
                {"type": "image", "name": "img", "source": "precomputed://mem://img"},
                {"type": "annotation", "name": "pts", "annotations": []}
            ]}"#,
        )
        .unwrap()
    }

    #[test]
    fn test_unknown_message() {
        let mut bot = bot(Box::new(MemoryPayloadStore::new()));
        let err = bot.handle("<@B> what now", Some("<@B>"), "me").unwrap_err();
        assert!(matches!(err, GtbotError::UnknownCommand(_)));
    }

    #[test]
    fn test_publish_uses_store_token() {
        let bot = bot(Box::new(MemoryPayloadStore::new()));
        let link = bot.publish(&payload()).unwrap();
        assert_eq!(link, "https://viewer.example/?json_url=memory://state/1");
        assert_eq!(bot.resolve(&link).unwrap(), payload());
    }

    #[test]
    fn test_publish_falls_back_to_inline_link() {
        let bot = bot(Box::new(OfflineStore));
        let link = bot.publish(&payload()).unwrap();
        assert!(link.starts_with("https://viewer.example/#!"));
        assert_eq!(bot.resolve(&link).unwrap(), payload());
    }

    #[test]
    fn test_cutouts_without_boxes() {
        let mut bot = bot(Box::new(MemoryPayloadStore::new()));
        let link = inline_link("https://viewer.example", &payload()).unwrap();
        let outcome = bot
            .handle(&format!("create cutouts {}", link), None, "me")
            .unwrap();
        assert!(matches!(outcome, Outcome::Cutouts { ref reports } if reports.is_empty()));
    }

    #[test]
    fn test_upload_missing_path() {
        let mut bot = bot(Box::new(MemoryPayloadStore::new()));
        let err = bot
            .upload("/definitely/not/here/raw", Bucket::Scratch, "me")
            .unwrap_err();
        assert!(err.to_string().contains("Cannot find the path"));
    }
}
