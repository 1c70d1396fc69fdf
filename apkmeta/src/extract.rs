//! Metadata extraction: manifest fields resolved against the resource table.

use crate::archive::Archive;
use crate::config::Configuration;
use crate::error::{Error, ErrorKind, Result};
use crate::manifest::Manifest;
use crate::size::format_size;
use crate::table::ResourceTable;
use crate::value::{TypedValue, Value};
use crate::xml::Document;
use base64::Engine;
use serde::{Serialize, Serializer};
use std::collections::BTreeMap;
use std::io::{Read, Seek};
use std::path::Path;
use tracing::{debug, trace, warn};

pub const MANIFEST_ENTRY: &str = "AndroidManifest.xml";
pub const RESOURCES_ENTRY: &str = "resources.arsc";

/// Icon densities to try, best first.
pub const ICON_DENSITIES: [u16; 12] = [640, 560, 480, 440, 420, 360, 320, 260, 240, 213, 160, 120];

/// The extracted record, serialized with the field names existing consumers
/// expect (including the `LaunchActivty` spelling).
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Metadata {
    pub file_size: u64,
    pub file_size_format: String,
    pub name: String,
    #[serde(rename = "NameCN")]
    pub name_cn: String,
    pub pkg: String,
    #[serde(serialize_with = "serialize_base64")]
    pub icon: Vec<u8>,
    #[serde(rename = "LaunchActivty")]
    pub launch_activity: String,
    pub version_code: i32,
    pub version_name: String,
    pub min_version: i32,
    pub target_version: i32,
    pub permissions: Vec<String>,
    pub meta_info: BTreeMap<String, String>,
}

fn serialize_base64<S: Serializer>(
    bytes: &[u8],
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    serializer.serialize_str(&base64::engine::general_purpose::STANDARD.encode(bytes))
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExtractOptions {
    /// Include permissions and meta-data.
    pub full: bool,
    /// Configuration for the localized label (`NameCN`).
    pub locale: Configuration,
    pub icon_densities: Vec<u16>,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        ExtractOptions {
            full: true,
            locale: Configuration::with_locale("zh", "CN"),
            icon_densities: ICON_DENSITIES.to_vec(),
        }
    }
}

pub fn extract<R: Read + Seek>(archive: &mut Archive<R>, want_full: bool) -> Result<Metadata> {
    let options = ExtractOptions {
        full: want_full,
        ..ExtractOptions::default()
    };
    options.extract(archive)
}

pub fn extract_file<P: AsRef<Path>>(path: P, options: &ExtractOptions) -> Result<Metadata> {
    let mut archive = Archive::open(path)?;
    options.extract(&mut archive)
}

/// Resolves manifest values, with or without a resource table.
struct Resolver<'t> {
    table: Option<&'t ResourceTable>,
}

impl<'t> Resolver<'t> {
    fn resolve(&self, value: &TypedValue, config: &Configuration) -> Result<Value> {
        match (value, self.table) {
            (TypedValue::Literal(v), _) => Ok(v.clone()),
            (TypedValue::Reference(id), Some(table)) => table.resolve(*id, config),
            (TypedValue::Reference(id), None) => Err(Error::not_found(format!(
                "no resource table to resolve {}",
                id
            ))),
        }
    }

    /// Optional text field; failures degrade to an empty string.
    fn text(&self, field: &str, value: Option<&TypedValue>, config: &Configuration) -> String {
        let value = match value {
            Some(value) => value,
            None => return String::new(),
        };
        match self.resolve(value, config) {
            Ok(v) => v.to_string(),
            Err(e) => {
                warn!("cannot resolve {} for {}: {}", field, config, e);
                String::new()
            }
        }
    }

    /// Optional integer field; failures degrade to 0.
    fn int(&self, field: &str, value: Option<&TypedValue>) -> i32 {
        let value = match value {
            Some(value) => value,
            None => return 0,
        };
        match self.resolve(value, &Configuration::default()) {
            Ok(v) => v.as_i32().unwrap_or_else(|| {
                warn!("{} is not an integer: {:?}", field, v);
                0
            }),
            Err(e) => {
                warn!("cannot resolve {}: {}", field, e);
                0
            }
        }
    }
}

impl ExtractOptions {
    pub fn extract<R: Read + Seek>(&self, archive: &mut Archive<R>) -> Result<Metadata> {
        let doc = Document::decode(&archive.read(MANIFEST_ENTRY)?)?;
        let manifest = Manifest::from_document(&doc);

        let table = match archive.read(RESOURCES_ENTRY) {
            Ok(bytes) => Some(ResourceTable::decode(&bytes)?),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("archive has no {}", RESOURCES_ENTRY);
                None
            }
            Err(e) => return Err(e),
        };
        let resolver = Resolver {
            table: table.as_ref(),
        };
        let default = Configuration::default();

        let pkg = match &manifest.package {
            Some(value) => resolver.resolve(value, &default)?.to_string(),
            None => String::new(),
        };
        if pkg.is_empty() {
            return Err(Error::not_found("package name in manifest"));
        }

        let size = archive.size();
        let mut metadata = Metadata {
            file_size: size,
            file_size_format: format_size(size),
            name: resolver.text("label", manifest.label.as_ref(), &default),
            name_cn: resolver.text("label", manifest.label.as_ref(), &self.locale),
            icon: self.icon(archive, &resolver, manifest.icon.as_ref()),
            launch_activity: manifest.launch_activity().unwrap_or_default().to_owned(),
            version_code: resolver.int("versionCode", manifest.version_code.as_ref()),
            version_name: resolver.text("versionName", manifest.version_name.as_ref(), &default),
            min_version: resolver.int("minSdkVersion", manifest.min_sdk.as_ref()),
            target_version: resolver.int("targetSdkVersion", manifest.target_sdk.as_ref()),
            pkg,
            ..Metadata::default()
        };

        if self.full {
            metadata.permissions = manifest.permissions.clone();
            for (name, value) in &manifest.meta_data {
                let value = resolver.text(name, Some(value), &default);
                if !name.is_empty() && !value.is_empty() {
                    metadata.meta_info.insert(name.clone(), value);
                }
            }
        }

        debug!(
            "extracted {} {} ({}), icon {} bytes",
            metadata.pkg,
            metadata.version_name,
            metadata.version_code,
            metadata.icon.len()
        );
        Ok(metadata)
    }

    /// Bytes of the first icon found, trying densities in order. Vector
    /// drawables (`.xml`) are skipped; no icon at all is not an error.
    fn icon<R: Read + Seek>(
        &self,
        archive: &mut Archive<R>,
        resolver: &Resolver,
        icon: Option<&TypedValue>,
    ) -> Vec<u8> {
        let icon = match icon {
            Some(icon) => icon,
            None => return Vec::new(),
        };
        for &density in &self.icon_densities {
            let config = Configuration::with_density(density);
            let path = match resolver.resolve(icon, &config) {
                Ok(Value::String(path)) => path,
                Ok(other) => {
                    trace!("icon at {} is not a path: {:?}", config, other);
                    continue;
                }
                Err(e) => {
                    trace!("no icon at {}: {}", config, e);
                    continue;
                }
            };
            if path.ends_with(".xml") {
                trace!("skipping vector icon {}", path);
                continue;
            }
            match archive.read(&path) {
                Ok(bytes) => return bytes,
                Err(e) => trace!("cannot read icon {}: {}", path, e),
            }
        }
        debug!("no usable icon found");
        Vec::new()
    }
}
