//! Sysfs GPIO input lines
//!
//! Each configured channel gets its pin exported, set to `in`, and its `value`
//! file held open for the lifetime of the source. A sample is a seek to 0 and a
//! one-byte read, which is cheap enough for the decoder's busy polling.
//!
//! Pins this source exported are unexported again on drop.

use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

use lb_error::{LapbeaconError, Result};
use tracing::{debug, info, warn};

use crate::config::ChannelConfig;
use crate::constants::gpio;
use crate::signal::SignalSource;
use crate::types::Channel;

#[derive(Debug)]
struct PinLine {
    pin: u32,
    value: File,
    exported_here: bool,
}

/// [`SignalSource`] over `/sys/class/gpio`.
#[derive(Debug)]
pub struct SysfsGpio {
    root: PathBuf,
    lines: HashMap<Channel, PinLine>,
}

impl SysfsGpio {
    /// Acquire every channel's pin. Any failure is fatal and releases the pins
    /// already acquired.
    pub fn open(root: impl Into<PathBuf>, channels: &[ChannelConfig]) -> Result<Self> {
        Self::open_with_timeout(root, channels, gpio::EXPORT_TIMEOUT)
    }

    pub fn open_with_timeout(
        root: impl Into<PathBuf>,
        channels: &[ChannelConfig],
        export_timeout: Duration,
    ) -> Result<Self> {
        let mut source = Self {
            root: root.into(),
            lines: HashMap::new(),
        };

        for ch in channels {
            let line = source.open_line(ch.pin, export_timeout)?;
            info!("Channel {} bound to GPIO {}", ch.id, ch.pin);
            source.lines.insert(Channel(ch.id), line);
        }

        Ok(source)
    }

    fn pin_dir(&self, pin: u32) -> PathBuf {
        self.root.join(format!("gpio{}", pin))
    }

    fn open_line(&self, pin: u32, export_timeout: Duration) -> Result<PinLine> {
        let dir = self.pin_dir(pin);
        let exported_here = !dir.exists();

        if exported_here {
            let export = self.root.join("export");
            if !export.exists() {
                return Err(LapbeaconError::gpio_unavailable(
                    pin,
                    format!("no sysfs GPIO interface at {:?}", self.root),
                ));
            }
            fs::write(&export, pin.to_string())
                .map_err(|e| LapbeaconError::gpio_unavailable(pin, format!("export failed: {}", e)))?;
            debug!("Exported GPIO {}", pin);
        }

        match Self::configure(&dir, pin, export_timeout) {
            Ok(value) => Ok(PinLine {
                pin,
                value,
                exported_here,
            }),
            Err(e) => {
                if exported_here {
                    self.unexport(pin);
                }
                Err(e)
            }
        }
    }

    fn configure(dir: &Path, pin: u32, export_timeout: Duration) -> Result<File> {
        let value_path = dir.join("value");
        let deadline = Instant::now() + export_timeout;
        while !value_path.exists() {
            if Instant::now() >= deadline {
                return Err(LapbeaconError::gpio_unavailable(
                    pin,
                    format!("{:?} did not appear", value_path),
                ));
            }
            thread::sleep(gpio::EXPORT_POLL_INTERVAL);
        }

        fs::write(dir.join("direction"), "in")
            .map_err(|e| LapbeaconError::gpio_unavailable(pin, format!("cannot set direction: {}", e)))?;

        File::open(&value_path)
            .map_err(|e| LapbeaconError::gpio_unavailable(pin, format!("cannot open value: {}", e)))
    }

    fn unexport(&self, pin: u32) {
        match fs::write(self.root.join("unexport"), pin.to_string()) {
            Ok(()) => debug!("Unexported GPIO {}", pin),
            Err(e) => warn!("Failed to unexport GPIO {}: {}", pin, e),
        }
    }

    /// Pin bound to `channel`.
    pub fn pin(&self, channel: Channel) -> Option<u32> {
        self.lines.get(&channel).map(|l| l.pin)
    }
}

impl SignalSource for SysfsGpio {
    fn read_level(&self, channel: Channel) -> Result<bool> {
        let line = self
            .lines
            .get(&channel)
            .ok_or(LapbeaconError::UnknownChannel(channel.id()))?;

        let mut file = &line.value;
        let mut buf = [0u8; 1];
        file.seek(SeekFrom::Start(0))
            .and_then(|_| file.read_exact(&mut buf))
            .map_err(|e| LapbeaconError::GpioRead {
                pin: line.pin,
                source: e,
            })?;

        match buf[0] {
            b'0' => Ok(false),
            b'1' => Ok(true),
            value => Err(LapbeaconError::GpioValue {
                pin: line.pin,
                value,
            }),
        }
    }
}

impl Drop for SysfsGpio {
    fn drop(&mut self) {
        for line in self.lines.values().filter(|l| l.exported_here) {
            self.unexport(line.pin);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    /// A sysfs tree where `pins` are already exported.
    fn fake_sysfs(pins: &[(u32, &str)]) -> TempDir {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("export"), "").unwrap();
        fs::write(dir.path().join("unexport"), "").unwrap();
        for (pin, level) in pins {
            let pin_dir = dir.path().join(format!("gpio{}", pin));
            fs::create_dir(&pin_dir).unwrap();
            fs::write(pin_dir.join("direction"), "out").unwrap();
            fs::write(pin_dir.join("value"), format!("{}\n", level)).unwrap();
        }
        dir
    }

    fn channels() -> Vec<ChannelConfig> {
        vec![ChannelConfig { id: 1, pin: 17 }, ChannelConfig { id: 2, pin: 18 }]
    }

    #[test]
    fn test_reads_levels_and_sets_direction() {
        let sysfs = fake_sysfs(&[(17, "1"), (18, "0")]);
        let gpio = SysfsGpio::open(sysfs.path(), &channels()).unwrap();

        assert!(gpio.read_level(Channel(1)).unwrap());
        assert!(!gpio.read_level(Channel(2)).unwrap());
        assert_eq!(gpio.pin(Channel(2)), Some(18));

        let direction = fs::read_to_string(sysfs.path().join("gpio17/direction")).unwrap();
        assert_eq!(direction, "in");
    }

    #[test]
    fn test_sees_level_changes() {
        let sysfs = fake_sysfs(&[(17, "1"), (18, "1")]);
        let gpio = SysfsGpio::open(sysfs.path(), &channels()).unwrap();
        assert!(gpio.read_level(Channel(1)).unwrap());

        fs::write(sysfs.path().join("gpio17/value"), "0\n").unwrap();
        assert!(!gpio.read_level(Channel(1)).unwrap());
    }

    #[test]
    fn test_garbage_value_is_an_error() {
        let sysfs = fake_sysfs(&[(17, "x"), (18, "0")]);
        let gpio = SysfsGpio::open(sysfs.path(), &channels()).unwrap();
        assert!(matches!(
            gpio.read_level(Channel(1)),
            Err(LapbeaconError::GpioValue { pin: 17, value: b'x' })
        ));
    }

    #[test]
    fn test_unknown_channel() {
        let sysfs = fake_sysfs(&[(17, "0"), (18, "0")]);
        let gpio = SysfsGpio::open(sysfs.path(), &channels()).unwrap();
        assert!(matches!(
            gpio.read_level(Channel(9)),
            Err(LapbeaconError::UnknownChannel(9))
        ));
    }

    #[test]
    fn test_missing_interface_is_fatal() {
        let dir = TempDir::new().unwrap();
        let err = SysfsGpio::open(dir.path(), &channels()).unwrap_err();
        assert!(matches!(err, LapbeaconError::GpioUnavailable { pin: 17, .. }));
        assert!(err.is_resource_failure());
    }

    #[test]
    fn test_export_that_never_appears() {
        let sysfs = fake_sysfs(&[(17, "0")]);
        let err = SysfsGpio::open_with_timeout(sysfs.path(), &channels(), Duration::from_millis(20))
            .unwrap_err();
        assert!(matches!(err, LapbeaconError::GpioUnavailable { pin: 18, .. }));

        // The export was attempted and then rolled back.
        assert_eq!(fs::read_to_string(sysfs.path().join("export")).unwrap(), "18");
        assert_eq!(fs::read_to_string(sysfs.path().join("unexport")).unwrap(), "18");
    }

    #[test]
    fn test_preexisting_exports_left_alone_on_drop() {
        let sysfs = fake_sysfs(&[(17, "0"), (18, "0")]);
        drop(SysfsGpio::open(sysfs.path(), &channels()).unwrap());
        assert_eq!(fs::read_to_string(sysfs.path().join("unexport")).unwrap(), "");
    }
}
