//! NVS (Non-Volatile Storage) adapter.
//!
//! Implements [`ConfigStore`]: the node configuration is persisted as a
//! single `postcard` blob under the `nodelink` namespace. Writes are
//! validated first and committed atomically (`nvs_commit`), so a power
//! loss never leaves a half-written config. Semantics are last-write-wins.
//!
//! On non-`espidf` targets the backend is an in-memory map for host tests.

use log::info;
#[cfg(target_os = "espidf")]
use log::warn;

use crate::config::NodeConfig;
use crate::error::StoreError;
use crate::ports::ConfigStore;

#[cfg(target_os = "espidf")]
use esp_idf_svc::sys::*;

const CONFIG_NAMESPACE: &str = "nodelink";
const CONFIG_KEY: &[u8] = b"nodecfg\0";

#[allow(dead_code)]
const MAX_BLOB_SIZE: usize = 1024;

pub struct NvsStore {
    #[cfg(not(target_os = "espidf"))]
    blob: std::cell::RefCell<Option<Vec<u8>>>,
}

impl NvsStore {
    /// Create the store and initialise NVS flash.
    ///
    /// Returns `Err(StoreError::IoError)` if flash initialisation fails
    /// unrecoverably. On first boot or after a version mismatch the NVS
    /// partition is erased and re-initialised automatically.
    pub fn new() -> Result<Self, StoreError> {
        #[cfg(target_os = "espidf")]
        {
            // SAFETY: nvs_flash_init / nvs_flash_erase run from the single
            // bootstrap context before any concurrent NVS access.
            let ret = unsafe { nvs_flash_init() };
            if ret == ESP_ERR_NVS_NO_FREE_PAGES || ret == ESP_ERR_NVS_NEW_VERSION_FOUND {
                warn!("NVS: erasing and re-initialising flash partition");
                if unsafe { nvs_flash_erase() } != ESP_OK {
                    return Err(StoreError::IoError);
                }
                if unsafe { nvs_flash_init() } != ESP_OK {
                    return Err(StoreError::IoError);
                }
            } else if ret != ESP_OK {
                return Err(StoreError::IoError);
            }
            info!("NvsStore: ESP-IDF NVS initialised");
        }

        #[cfg(not(target_os = "espidf"))]
        info!("NvsStore: simulation backend");

        Ok(Self {
            #[cfg(not(target_os = "espidf"))]
            blob: std::cell::RefCell::new(None),
        })
    }

    /// Open the config namespace, run a closure with the handle, close.
    #[cfg(target_os = "espidf")]
    fn with_nvs_handle<F, T>(write: bool, f: F) -> Result<T, i32>
    where
        F: FnOnce(nvs_handle_t) -> Result<T, i32>,
    {
        let mut ns_buf = [0u8; 16];
        let ns_bytes = CONFIG_NAMESPACE.as_bytes();
        ns_buf[..ns_bytes.len()].copy_from_slice(ns_bytes);

        let mut handle: nvs_handle_t = 0;
        let mode = if write {
            nvs_open_mode_t_NVS_READWRITE
        } else {
            nvs_open_mode_t_NVS_READONLY
        };

        let ret = unsafe { nvs_open(ns_buf.as_ptr() as *const _, mode, &mut handle) };
        if ret != ESP_OK {
            return Err(ret);
        }

        let result = f(handle);
        unsafe {
            nvs_close(handle);
        }
        result
    }
}

impl ConfigStore for NvsStore {
    fn load(&self) -> Result<NodeConfig, StoreError> {
        #[cfg(not(target_os = "espidf"))]
        {
            match self.blob.borrow().as_deref() {
                Some(bytes) => {
                    let cfg: NodeConfig =
                        postcard::from_bytes(bytes).map_err(|_| StoreError::Corrupted)?;
                    info!("NvsStore: loaded config from store");
                    Ok(cfg)
                }
                None => {
                    info!("NvsStore: no stored config, using defaults");
                    Ok(NodeConfig::default())
                }
            }
        }

        #[cfg(target_os = "espidf")]
        {
            let result = Self::with_nvs_handle(false, |handle| {
                let mut size: usize = 0;
                let ret = unsafe {
                    nvs_get_blob(
                        handle,
                        CONFIG_KEY.as_ptr() as *const _,
                        core::ptr::null_mut(),
                        &mut size,
                    )
                };
                if ret != ESP_OK || size == 0 || size > MAX_BLOB_SIZE {
                    return Err(ret);
                }

                let mut buf = vec![0u8; size];
                let ret = unsafe {
                    nvs_get_blob(
                        handle,
                        CONFIG_KEY.as_ptr() as *const _,
                        buf.as_mut_ptr() as *mut _,
                        &mut size,
                    )
                };
                if ret != ESP_OK {
                    return Err(ret);
                }
                Ok(buf)
            });

            match result {
                Ok(bytes) => {
                    let cfg: NodeConfig =
                        postcard::from_bytes(&bytes).map_err(|_| StoreError::Corrupted)?;
                    info!("NvsStore: loaded config from NVS ({} bytes)", bytes.len());
                    Ok(cfg)
                }
                Err(e) if e == ESP_ERR_NVS_NOT_FOUND => {
                    info!("NvsStore: no stored config, using defaults");
                    Ok(NodeConfig::default())
                }
                Err(e) => {
                    warn!("NvsStore: NVS read error {}, using defaults", e);
                    Ok(NodeConfig::default())
                }
            }
        }
    }

    fn save(&mut self, config: &NodeConfig) -> Result<(), StoreError> {
        config.validate()?;
        let bytes = postcard::to_allocvec(config).map_err(|_| StoreError::IoError)?;

        #[cfg(not(target_os = "espidf"))]
        {
            *self.blob.borrow_mut() = Some(bytes);
            info!("NvsStore: config saved (simulation)");
            Ok(())
        }

        #[cfg(target_os = "espidf")]
        {
            let result = Self::with_nvs_handle(true, |handle| {
                let ret = unsafe {
                    nvs_set_blob(
                        handle,
                        CONFIG_KEY.as_ptr() as *const _,
                        bytes.as_ptr() as *const _,
                        bytes.len(),
                    )
                };
                if ret != ESP_OK {
                    return Err(ret);
                }
                let ret = unsafe { nvs_commit(handle) };
                if ret != ESP_OK {
                    return Err(ret);
                }
                Ok(())
            });
            match result {
                Ok(()) => {
                    info!("NvsStore: config saved to NVS ({} bytes)", bytes.len());
                    Ok(())
                }
                Err(e) => {
                    warn!("NvsStore: NVS write error {}", e);
                    Err(StoreError::IoError)
                }
            }
        }
    }

    fn clear(&mut self) -> Result<(), StoreError> {
        #[cfg(not(target_os = "espidf"))]
        {
            *self.blob.borrow_mut() = None;
            info!("NvsStore: config cleared (simulation)");
            Ok(())
        }

        #[cfg(target_os = "espidf")]
        {
            let result = Self::with_nvs_handle(true, |handle| {
                let ret = unsafe { nvs_erase_all(handle) };
                if ret != ESP_OK {
                    return Err(ret);
                }
                let ret = unsafe { nvs_commit(handle) };
                if ret != ESP_OK {
                    return Err(ret);
                }
                Ok(())
            });
            match result {
                Ok(()) => {
                    info!("NvsStore: config cleared");
                    Ok(())
                }
                Err(e) => {
                    warn!("NvsStore: NVS erase error {}", e);
                    Err(StoreError::IoError)
                }
            }
        }
    }
}
