//! Asset generation with change detection.
//!
//! Two layers keep regeneration cheap. The per-target asset table records a
//! hash of every asset type in the source, so a type whose markup is
//! unchanged is skipped entirely. Below that, images with an `xml:id` are
//! cached by the hash of their own markup under the generated cache, so a
//! type that did change can often be restored without calling the core.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use pretext_project::assets::{
    asset_items, asset_table, clean_asset_table, load_asset_table, save_asset_table, AssetItem,
};
use pretext_project::xml::Element;
use pretext_project::AssetType;

use crate::builder::Builder;
use crate::engine::AssetJob;
use crate::error::BuildError;

/// Options for [`Builder::generate_assets`].
#[derive(Debug, Clone)]
pub struct GenerateOptions {
    /// Asset types to consider; `None` means all of them.
    pub requested: Option<Vec<AssetType>>,

    /// Produce every output format instead of those the target uses.
    pub all_formats: bool,

    /// Skip types whose hash matches the saved table.
    pub only_changed: bool,

    /// Restrict generation to the subtree rooted at this `xml:id`.
    pub xmlid: Option<String>,

    /// Remove generated assets and the cache first.
    pub clean: bool,

    /// Ignore cached images.
    pub skip_cache: bool,
}

impl Default for GenerateOptions {
    fn default() -> Self {
        Self {
            requested: None,
            all_formats: false,
            only_changed: true,
            xmlid: None,
            clean: false,
            skip_cache: false,
        }
    }
}

impl GenerateOptions {
    fn only(asset: AssetType) -> Self {
        Self {
            requested: Some(vec![asset]),
            only_changed: false,
            ..Default::default()
        }
    }

    fn requests_only(&self, asset: AssetType) -> bool {
        matches!(self.requested.as_deref(), Some([only]) if *only == asset)
    }
}

/// What a call to [`Builder::generate_assets`] did.
#[derive(Debug, Default, PartialEq)]
pub struct GenerateReport {
    /// Types that were produced, by the core or from the cache.
    pub generated: Vec<AssetType>,

    /// Types restored entirely from the image cache.
    pub cached: Vec<AssetType>,

    pub failed: Vec<AssetType>,
}

impl Builder<'_> {
    pub fn generate_assets(&self, options: &GenerateOptions) -> Result<GenerateReport, BuildError> {
        tracing::info!("Generating any needed assets.");
        let target = self.target;

        if options.clean {
            self.clean_assets()?;
        }

        let cache = target.generated_cache_abspath();
        for asset in AssetType::CACHEABLE {
            let dir = cache.join(asset.as_str());
            fs::create_dir_all(&dir).map_err(|e| BuildError::io(&dir, e))?;
        }
        tracing::debug!("Using cached assets in {} where possible.", cache.display());

        // Everything but webwork needs the webwork representations, and
        // everything but webwork and myopenmath needs the static problems.
        if !options.requests_only(AssetType::Webwork) {
            self.ensure_webwork_reps()?;
            if !options.requests_only(AssetType::Myopenmath) {
                self.ensure_myopenmath()?;
            }
        }

        let requested: Vec<AssetType> = options
            .requested
            .clone()
            .unwrap_or_else(|| AssetType::ALL.to_vec())
            .into_iter()
            .filter(|asset| asset.allowed_for(target.format))
            .collect();
        tracing::debug!(
            "Based on format {}, assets to be generated are: {:?}.",
            target.format,
            requested
        );

        let source = target.source_element()?;
        let source_table = asset_table(&source);
        let table_path = target.asset_table_path();
        let mut saved_table = clean_asset_table(load_asset_table(&table_path), &source_table);

        let considered: Vec<AssetType> = AssetType::ALL
            .iter()
            .copied()
            .filter(|asset| requested.contains(asset) && source_table.contains_key(asset.as_str()))
            .collect();
        tracing::debug!(
            "Based on what is in your source, the assets that will be considered are {:?}.",
            considered
        );

        let to_generate: Vec<AssetType> = if options.only_changed {
            considered
                .into_iter()
                .filter(|asset| saved_table.get(asset.as_str()) != source_table.get(asset.as_str()))
                .collect()
        } else {
            considered
        };
        tracing::debug!("Assets to be generated: {:?}", to_generate);

        for asset in &to_generate {
            self.ensure_asset_directories(Some(*asset))?;
        }

        let mut report = GenerateReport::default();
        for asset in &to_generate {
            match self.generate_type(*asset, &source, options) {
                Ok(from_cache) => {
                    report.generated.push(*asset);
                    if from_cache {
                        report.cached.push(*asset);
                    }
                }
                Err(e) => {
                    tracing::error!("Unable to generate some {} assets: {}", asset, e);
                    report.failed.push(*asset);
                }
            }
            if *asset == AssetType::Youtube {
                self.ensure_play_button()?;
            }
        }

        if to_generate.contains(&AssetType::Interactive) || to_generate.contains(&AssetType::Youtube) {
            let job = self.asset_job("qrcode", "qrcode", None, options.xmlid.as_deref())?;
            if let Err(e) = self.engine.generate(&job) {
                tracing::error!("Unable to generate some qrcodes: {}", e);
            }
        }

        tracing::debug!("Updated these assets successfully: {:?}", report.generated);
        // A subtree build cannot vouch for every asset of a type.
        if !report.generated.is_empty() && options.xmlid.is_none() {
            for asset in &report.generated {
                if let Some(hash) = source_table.get(asset.as_str()) {
                    saved_table.insert(asset.as_str().to_string(), hash.clone());
                }
            }
            save_asset_table(&table_path, &saved_table)?;
        }
        tracing::info!("Finished generating assets.");
        Ok(report)
    }

    /// Generate one type; returns whether it was restored from the cache.
    fn generate_type(
        &self,
        asset: AssetType,
        source: &Element,
        options: &GenerateOptions,
    ) -> Result<bool, BuildError> {
        let target = self.target;
        let outformats = asset.output_formats(target.format, options.all_formats);
        let dest_dir = target.generated_dir_abspath()?.join(asset.output_dir());

        let cache = if asset.is_cacheable() {
            ImageCache::new(
                target.generated_cache_abspath().join(asset.as_str()),
                dest_dir.clone(),
                asset,
                &outformats,
                asset_items(source, asset),
            )
        } else {
            None
        };

        if let Some(cache) = &cache {
            if !options.skip_cache && cache.restore()? {
                tracing::info!("Restored {} assets from the cache.", asset);
                return Ok(true);
            }
        }

        let method = match asset {
            AssetType::LatexImage => Some(target.latex_engine.as_str().to_string()),
            AssetType::Asymptote => Some(target.asy_method().as_str().to_string()),
            _ => None,
        };
        for outformat in outformats {
            let outformat = (!outformat.is_empty()).then(|| outformat.to_string());
            let mut job = self.asset_job(
                asset.component(),
                asset.output_dir(),
                outformat,
                options.xmlid.as_deref(),
            )?;
            job.method = method.clone();
            self.engine.generate(&job)?;
        }

        if let Some(cache) = &cache {
            cache.store()?;
        }
        Ok(false)
    }

    fn asset_job(
        &self,
        component: &str,
        dir: &str,
        outformat: Option<String>,
        xmlid: Option<&str>,
    ) -> Result<AssetJob, BuildError> {
        let target = self.target;
        Ok(AssetJob {
            component: component.to_string(),
            source: target.source_abspath(),
            publication: target.publication_abspath(),
            stringparams: self.stringparams(),
            dest_dir: target.generated_dir_abspath()?.join(dir),
            outformat,
            xmlid: xmlid.map(str::to_string),
            method: None,
            servers: target.servers.clone(),
        })
    }

    /// Make sure `webwork-representations.xml` exists when the source has WeBWorK problems.
    pub fn ensure_webwork_reps(&self) -> Result<(), BuildError> {
        let source = self.target.source_element()?;
        if AssetType::Webwork.select(&source).is_empty() {
            tracing::debug!("Source does not contain webwork problems");
            return Ok(());
        }
        let reps = self
            .target
            .generated_dir_abspath()?
            .join("webwork")
            .join("webwork-representations.xml");
        if reps.exists() {
            tracing::debug!("Webwork representations file exists, not generating");
            return Ok(());
        }
        tracing::debug!("Webwork representations file does not exist, generating");
        self.generate_assets(&GenerateOptions::only(AssetType::Webwork))?;
        Ok(())
    }

    /// Make sure every MyOpenMath problem has its static `mom-<n>.xml`.
    pub fn ensure_myopenmath(&self) -> Result<(), BuildError> {
        let source = self.target.source_element()?;
        let problems: Vec<String> = AssetType::Myopenmath
            .select(&source)
            .into_iter()
            .filter_map(|element| element.attr("problem").map(str::to_string))
            .collect();
        if problems.is_empty() {
            tracing::debug!("Source does not contain myopenmath problems");
            return Ok(());
        }

        let dir = self.target.generated_dir_abspath()?.join("problems");
        fs::create_dir_all(&dir).map_err(|e| BuildError::io(&dir, e))?;
        let missing = problems
            .iter()
            .find(|problem| !dir.join(format!("mom-{}.xml", problem)).exists());
        if let Some(problem) = missing {
            tracing::debug!("MyOpenMath problem {} does not exist, generating", problem);
            self.generate_assets(&GenerateOptions::only(AssetType::Myopenmath))?;
        }
        Ok(())
    }

    fn ensure_play_button(&self) -> Result<(), BuildError> {
        let job = self.asset_job("play-button", "play-button", None, None)?;
        match self.engine.generate(&job) {
            Ok(()) => tracing::debug!("Play button generated"),
            Err(e) => tracing::warn!("Failed to generate play button: {}", e),
        }
        Ok(())
    }
}

/// Content-addressed store of individual images of one asset type.
struct ImageCache {
    dir: PathBuf,
    dest_dir: PathBuf,
    extensions: Vec<&'static str>,
    items: Vec<AssetItem>,
}

impl ImageCache {
    /// `None` when the images cannot be cached: unnamed items or no known extensions.
    fn new(
        dir: PathBuf,
        dest_dir: PathBuf,
        asset: AssetType,
        outformats: &[&str],
        items: Option<Vec<AssetItem>>,
    ) -> Option<Self> {
        let items = items.filter(|items| !items.is_empty())?;
        let extensions: BTreeSet<&'static str> = outformats
            .iter()
            .flat_map(|outformat| asset.cache_extensions(outformat))
            .collect();
        if extensions.is_empty() {
            return None;
        }
        Some(Self {
            dir,
            dest_dir,
            extensions: extensions.into_iter().collect(),
            items,
        })
    }

    fn cached(&self, item: &AssetItem, ext: &str) -> PathBuf {
        self.dir.join(format!("{}.{}", item.hash, ext))
    }

    fn generated(&self, item: &AssetItem, ext: &str) -> PathBuf {
        self.dest_dir.join(format!("{}.{}", item.id, ext))
    }

    fn pairs(&self) -> impl Iterator<Item = (&AssetItem, &'static str)> + '_ {
        self.items
            .iter()
            .flat_map(move |item| self.extensions.iter().map(move |ext| (item, *ext)))
    }

    /// Copy every cached image into place, if all of them are cached.
    fn restore(&self) -> Result<bool, BuildError> {
        if !self.pairs().all(|(item, ext)| self.cached(item, ext).exists()) {
            return Ok(false);
        }
        fs::create_dir_all(&self.dest_dir).map_err(|e| BuildError::io(&self.dest_dir, e))?;
        for (item, ext) in self.pairs() {
            copy_file(&self.cached(item, ext), &self.generated(item, ext))?;
        }
        Ok(true)
    }

    /// Save freshly generated images under their hashes.
    fn store(&self) -> Result<(), BuildError> {
        for (item, ext) in self.pairs() {
            let generated = self.generated(item, ext);
            if generated.exists() {
                copy_file(&generated, &self.cached(item, ext))?;
            }
        }
        Ok(())
    }
}

fn copy_file(from: &Path, to: &Path) -> Result<(), BuildError> {
    if let Some(parent) = to.parent() {
        fs::create_dir_all(parent).map_err(|e| BuildError::io(parent, e))?;
    }
    fs::copy(from, to).map_err(|e| BuildError::io(from, e))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::testing::RecordingEngine;
    use crate::testing::{fixture, Fixture};
    use pretty_assertions::assert_eq;

    const IMAGES: &str = r#"<book><title>Images</title>
      <image xml:id="circle"><latex-image>\draw (0,0) circle (1);</latex-image></image>
      <video xml:id="clip" youtube="abc123"/>
    </book>"#;

    fn svg_engine() -> RecordingEngine {
        RecordingEngine {
            produces: vec![("latex-image".to_string(), "circle.svg".to_string())],
            ..Default::default()
        }
    }

    #[test]
    fn generates_types_present_in_source() {
        let Fixture { project, _temp } = fixture(IMAGES);
        let target = project.target(Some("web")).unwrap();
        let engine = svg_engine();

        let report = Builder::new(target, &engine)
            .generate_assets(&GenerateOptions::default())
            .unwrap();

        assert_eq!(report.generated, vec![AssetType::LatexImage, AssetType::Youtube]);
        assert_eq!(
            engine.components(),
            vec!["latex-image", "youtube", "play-button", "qrcode"]
        );
        let table = load_asset_table(&target.asset_table_path());
        assert_eq!(table.keys().collect::<Vec<_>>(), vec!["latex-image", "youtube"]);
    }

    #[test]
    fn unchanged_types_are_skipped() {
        let Fixture { project, _temp } = fixture(IMAGES);
        let target = project.target(Some("web")).unwrap();
        let builder_engine = svg_engine();
        let builder = Builder::new(target, &builder_engine);
        builder.generate_assets(&GenerateOptions::default()).unwrap();

        let engine = svg_engine();
        let report = Builder::new(target, &engine)
            .generate_assets(&GenerateOptions::default())
            .unwrap();

        assert!(report.generated.is_empty());
        assert!(engine.components().is_empty());
    }

    #[test]
    fn cached_images_skip_the_engine() {
        let Fixture { project, _temp } = fixture(IMAGES);
        let target = project.target(Some("web")).unwrap();
        let first = svg_engine();
        Builder::new(target, &first)
            .generate_assets(&GenerateOptions::default())
            .unwrap();
        let generated = target.generated_dir_abspath().unwrap().join("latex-image/circle.svg");
        fs::remove_file(&generated).unwrap();

        let engine = svg_engine();
        let report = Builder::new(target, &engine)
            .generate_assets(&GenerateOptions {
                requested: Some(vec![AssetType::LatexImage]),
                only_changed: false,
                ..Default::default()
            })
            .unwrap();

        assert_eq!(report.cached, vec![AssetType::LatexImage]);
        assert!(engine.components().is_empty());
        assert!(generated.exists());
    }

    #[test]
    fn skip_cache_calls_the_engine() {
        let Fixture { project, _temp } = fixture(IMAGES);
        let target = project.target(Some("web")).unwrap();
        let first = svg_engine();
        Builder::new(target, &first)
            .generate_assets(&GenerateOptions::default())
            .unwrap();

        let engine = svg_engine();
        Builder::new(target, &engine)
            .generate_assets(&GenerateOptions {
                requested: Some(vec![AssetType::LatexImage]),
                only_changed: false,
                skip_cache: true,
                ..Default::default()
            })
            .unwrap();

        assert_eq!(engine.components(), vec!["latex-image"]);
    }

    #[test]
    fn failures_are_not_recorded_in_the_table() {
        let Fixture { project, _temp } = fixture(IMAGES);
        let target = project.target(Some("web")).unwrap();
        let engine = RecordingEngine {
            failing: vec!["youtube".to_string()],
            ..svg_engine()
        };

        let report = Builder::new(target, &engine)
            .generate_assets(&GenerateOptions::default())
            .unwrap();

        assert_eq!(report.failed, vec![AssetType::Youtube]);
        let table = load_asset_table(&target.asset_table_path());
        assert!(!table.contains_key("youtube"));
        assert!(table.contains_key("latex-image"));
    }

    #[test]
    fn xmlid_restricted_runs_leave_the_table_alone() {
        let Fixture { project, _temp } = fixture(IMAGES);
        let target = project.target(Some("web")).unwrap();
        let engine = svg_engine();

        Builder::new(target, &engine)
            .generate_assets(&GenerateOptions {
                xmlid: Some("circle".to_string()),
                ..Default::default()
            })
            .unwrap();

        assert!(!target.asset_table_path().exists());
    }

    #[test]
    fn pdf_targets_need_no_latex_images() {
        let Fixture { project, _temp } = fixture(IMAGES);
        let target = project.target(Some("print")).unwrap();
        let engine = RecordingEngine::default();

        let report = Builder::new(target, &engine)
            .generate_assets(&GenerateOptions {
                requested: Some(vec![AssetType::LatexImage]),
                ..Default::default()
            })
            .unwrap();

        assert_eq!(report.generated, vec![AssetType::LatexImage]);
        assert!(engine.components().is_empty());
    }

    #[test]
    fn webwork_representations_are_ensured_first() {
        let Fixture { project, _temp } = fixture(
            "<book><title>W</title><exercise><webwork><statement><p>1+1</p></statement></webwork></exercise></book>",
        );
        let target = project.target(Some("web")).unwrap();
        let engine = RecordingEngine {
            produces: vec![("webwork".to_string(), "webwork-representations.xml".to_string())],
            ..Default::default()
        };

        Builder::new(target, &engine)
            .generate_assets(&GenerateOptions::default())
            .unwrap();

        assert_eq!(engine.components(), vec!["webwork"]);
    }

    #[test]
    fn missing_myopenmath_problems_are_generated() {
        let Fixture { project, _temp } =
            fixture(r#"<book><title>M</title><exercise><myopenmath problem="42"/></exercise></book>"#);
        let target = project.target(Some("web")).unwrap();
        let engine = RecordingEngine {
            produces: vec![("mom".to_string(), "mom-42.xml".to_string())],
            ..Default::default()
        };

        Builder::new(target, &engine)
            .generate_assets(&GenerateOptions::default())
            .unwrap();

        assert_eq!(engine.components(), vec!["mom"]);
    }
}
