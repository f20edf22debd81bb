//! Image reference resolution.
//!
//! SLAs rarely carry fully-qualified image references; this module fills
//! in the registry, tag, and architecture suffix from node defaults and
//! makes sure the resolved image is present before a service is created.
//!
//! ## Resolution Rules
//!
//! An SLA image containing both `/` and `:` is treated as fully qualified
//! and used verbatim. Otherwise the reference is composed as
//! `"{registry}/{image}{archSuffix}:{tag}"`:
//!
//! | Part | SLA override | Default |
//! |------|--------------|---------|
//! | image | `sla.image` | `sla.name` |
//! | registry | `sla.registry` | `options.default_registry` |
//! | tag | `sla.tag` | `options.version` |
//! | archSuffix | — | `"-{options.arch}"`, empty without arch |

use crate::config::ManagerOptions;
use crate::error::{Error, Result};
use crate::runtime::ContainerRuntime;
use crate::sla::Sla;
use tracing::{debug, warn};

/// Resolves an SLA's image to a fully-qualified reference.
pub fn resolve_image(sla: &Sla, options: &ManagerOptions) -> String {
    if let Some(image) = &sla.image {
        if image.contains('/') && image.contains(':') {
            return image.clone();
        }
    }

    let image = sla
        .image
        .as_deref()
        .filter(|i| !i.is_empty())
        .unwrap_or(&sla.name);

    let registry = sla
        .registry
        .as_deref()
        .filter(|r| !r.is_empty())
        .unwrap_or(&options.default_registry);

    let tag = sla
        .tag
        .as_deref()
        .filter(|t| !t.is_empty())
        .unwrap_or(&options.version);

    format!("{}/{}{}:{}", registry, image, options.arch_suffix(), tag)
}

/// Ensures an image is present locally, pulling it when missing.
///
/// # Errors
///
/// [`Error::ImageUnavailable`] when the image is absent and the pull did
/// not produce it.
pub async fn ensure_image(
    runtime: &dyn ContainerRuntime,
    name: &str,
    image: &str,
    registry_host: &str,
) -> Result<()> {
    if runtime.image_exists(image).await? {
        debug!("image {} already present", image);
        return Ok(());
    }

    debug!("pulling image {}", image);
    if let Err(e) = runtime.pull_image(image, registry_host).await {
        warn!("pull of {} failed: {}", image, e);
    }

    if runtime.image_exists(image).await? {
        return Ok(());
    }

    Err(Error::ImageUnavailable {
        name: name.to_string(),
        image: image.to_string(),
    })
}
