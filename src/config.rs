use crate::output::DEFAULT_JPEG_QUALITY;
use crate::source::{SourceAddress, SourceConfig};
use serde::Deserialize;
use std::ops::RangeInclusive;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_CONFIG_FILE: &str = "settings.toml";

const DEFAULT_FPS: u32 = 10;
const DEFAULT_WIDTH: u32 = 1280;
const DEFAULT_HEIGHT: u32 = 720;
const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;
const DEFAULT_USB_STAGGER_SECS: u64 = 10;

const FPS_RANGE: RangeInclusive<u32> = 0..=60;
const WIDTH_RANGE: RangeInclusive<u32> = 320..=2560;
const HEIGHT_RANGE: RangeInclusive<u32> = 200..=2048;
const QUALITY_RANGE: RangeInclusive<u8> = 1..=100;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read settings file {path}")]
    Read {
        path: PathBuf,
        #[source]
        cause: std::io::Error,
    },

    #[error("invalid settings file {path}")]
    Parse {
        path: PathBuf,
        #[source]
        cause: toml::de::Error,
    },

    #[error("{field} must be within {min}..={max}, got {value}")]
    OutOfRange {
        field: &'static str,
        value: u64,
        min: u64,
        max: u64,
    },

    #[error("no cameras configured: add [[network]] entries or a [usb] section")]
    NoSources,

    #[error("camera {index} has an empty {field}")]
    Empty { index: usize, field: &'static str },
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct SettingsFile {
    general: Option<GeneralFile>,
    #[serde(default)]
    network: Vec<CameraFile>,
    usb: Option<UsbFile>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct GeneralFile {
    fps: Option<u32>,
    width: Option<u32>,
    height: Option<u32>,
    connect_timeout_secs: Option<u64>,
    usb_stagger_secs: Option<u64>,
    jpeg_quality: Option<u8>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct CameraFile {
    address: SourceAddress,
    folder: PathBuf,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct UsbFile {
    index: u32,
    folder: PathBuf,
}

/// One camera entry, before ids and run numbers are assigned.
#[derive(Debug, Clone, PartialEq)]
pub struct CameraSettings {
    pub address: SourceAddress,
    pub folder: PathBuf,
}

/// Validated contents of the settings file.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub fps: u32,
    pub width: u32,
    pub height: u32,
    pub connect_timeout: Duration,
    pub usb_stagger: Duration,
    pub jpeg_quality: u8,
    /// Network cameras first, in file order, then the USB camera
    pub cameras: Vec<CameraSettings>,
}

impl Settings {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|cause| ConfigError::Read {
            path: path.to_path_buf(),
            cause,
        })?;
        Self::parse(&raw).map_err(|e| match e {
            ParseFailure::Toml(cause) => ConfigError::Parse {
                path: path.to_path_buf(),
                cause,
            },
            ParseFailure::Invalid(e) => e,
        })
    }

    pub fn from_toml(raw: &str) -> Result<Self, ConfigError> {
        Self::parse(raw).map_err(|e| match e {
            ParseFailure::Toml(cause) => ConfigError::Parse {
                path: PathBuf::from("<inline>"),
                cause,
            },
            ParseFailure::Invalid(e) => e,
        })
    }

    fn parse(raw: &str) -> Result<Self, ParseFailure> {
        let file: SettingsFile = toml::from_str(raw).map_err(ParseFailure::Toml)?;
        let settings = Self::from_file(file);
        settings.validate().map_err(ParseFailure::Invalid)?;
        Ok(settings)
    }

    fn from_file(file: SettingsFile) -> Self {
        let general = file.general.unwrap_or_default();
        let mut cameras: Vec<CameraSettings> = file
            .network
            .into_iter()
            .map(|camera| CameraSettings {
                address: camera.address,
                folder: camera.folder,
            })
            .collect();
        if let Some(usb) = file.usb {
            cameras.push(CameraSettings {
                address: SourceAddress::Device(usb.index),
                folder: usb.folder,
            });
        }

        Self {
            fps: general.fps.unwrap_or(DEFAULT_FPS),
            width: general.width.unwrap_or(DEFAULT_WIDTH),
            height: general.height.unwrap_or(DEFAULT_HEIGHT),
            connect_timeout: Duration::from_secs(
                general
                    .connect_timeout_secs
                    .unwrap_or(DEFAULT_CONNECT_TIMEOUT_SECS),
            ),
            usb_stagger: Duration::from_secs(
                general.usb_stagger_secs.unwrap_or(DEFAULT_USB_STAGGER_SECS),
            ),
            jpeg_quality: general.jpeg_quality.unwrap_or(DEFAULT_JPEG_QUALITY),
            cameras,
        }
    }

    /// Check ranges. Called by the loaders and again after CLI overrides.
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_range("fps", self.fps, &FPS_RANGE)?;
        check_range("width", self.width, &WIDTH_RANGE)?;
        check_range("height", self.height, &HEIGHT_RANGE)?;
        check_range("jpeg_quality", self.jpeg_quality, &QUALITY_RANGE)?;
        if self.connect_timeout.is_zero() {
            return Err(ConfigError::OutOfRange {
                field: "connect_timeout_secs",
                value: 0,
                min: 1,
                max: u64::MAX,
            });
        }

        if self.cameras.is_empty() {
            return Err(ConfigError::NoSources);
        }
        for (index, camera) in self.cameras.iter().enumerate() {
            if matches!(&camera.address, SourceAddress::Uri(uri) if uri.trim().is_empty()) {
                return Err(ConfigError::Empty {
                    index: index + 1,
                    field: "address",
                });
            }
            if camera.folder.as_os_str().is_empty() {
                return Err(ConfigError::Empty {
                    index: index + 1,
                    field: "folder",
                });
            }
        }
        Ok(())
    }

    /// Source list for one run. Ids follow the camera order.
    pub fn sources(&self, run_iteration: u64) -> Vec<SourceConfig> {
        self.cameras
            .iter()
            .enumerate()
            .map(|(id, camera)| SourceConfig {
                id,
                address: camera.address.clone(),
                target_fps: self.fps,
                frame_width: self.width,
                frame_height: self.height,
                output_folder: camera.folder.clone(),
                run_iteration,
            })
            .collect()
    }
}

enum ParseFailure {
    Toml(toml::de::Error),
    Invalid(ConfigError),
}

fn check_range<T>(
    field: &'static str,
    value: T,
    range: &RangeInclusive<T>,
) -> Result<(), ConfigError>
where
    T: Copy + PartialOrd + Into<u64>,
{
    if range.contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::OutOfRange {
            field,
            value: value.into(),
            min: (*range.start()).into(),
            max: (*range.end()).into(),
        })
    }
}
