//! Validation of training parameters and loss values.

use mseg_model::UNet3dConfig;

use crate::error::{Result, SegmentationError};

/// Validate learning rate.
pub fn validate_learning_rate(lr: f64) -> Result<()> {
    if !(lr > 0.0) {
        return Err(SegmentationError::invalid_configuration(format!(
            "Learning rate must be positive, got {}",
            lr
        )));
    }
    if lr > 10.0 {
        return Err(SegmentationError::invalid_configuration(format!(
            "Learning rate too large: {}",
            lr
        )));
    }
    Ok(())
}

/// Validate epoch count.
pub fn validate_epochs(epochs: usize) -> Result<()> {
    if epochs == 0 {
        return Err(SegmentationError::invalid_configuration("max_epochs must be positive"));
    }
    Ok(())
}

/// Validate batch size.
pub fn validate_batch_size(batch_size: usize) -> Result<()> {
    if batch_size == 0 {
        return Err(SegmentationError::invalid_configuration("batch_size must be positive"));
    }
    Ok(())
}

/// Validate U-Net level layout before [`UNet3dConfig::init`].
pub fn validate_network(config: &UNet3dConfig) -> Result<()> {
    if config.channels.len() < 2 || config.strides.len() + 1 != config.channels.len() {
        return Err(SegmentationError::invalid_configuration(format!(
            "U-Net needs one stride per down level, got channels {:?} and strides {:?}",
            config.channels, config.strides
        )));
    }
    let zero_width = config.in_channels == 0 || config.out_channels == 0 || config.channels.contains(&0);
    if zero_width || config.strides.contains(&0) {
        return Err(SegmentationError::invalid_configuration(format!(
            "U-Net channels and strides must be positive, got channels {:?} and strides {:?}",
            config.channels, config.strides
        )));
    }
    Ok(())
}

/// Reject NaN or infinite losses.
pub fn validate_loss(loss: f64, context: &str) -> Result<f64> {
    if loss.is_finite() {
        Ok(loss)
    } else {
        Err(SegmentationError::numerical_instability(format!(
            "{} loss is {}",
            context, loss
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_learning_rate() {
        assert!(validate_learning_rate(1e-2).is_ok());
        assert!(validate_learning_rate(0.0).is_err());
        assert!(validate_learning_rate(f64::NAN).is_err());
        assert!(validate_learning_rate(100.0).is_err());
    }

    #[test]
    fn test_validate_loss() {
        assert_eq!(validate_loss(0.5, "train").unwrap(), 0.5);
        let err = validate_loss(f64::NAN, "train").unwrap_err();
        assert!(matches!(err, SegmentationError::NumericalInstability(_)));
    }

    #[test]
    fn test_validate_network() {
        assert!(validate_network(&UNet3dConfig::new()).is_ok());
        let mismatched = UNet3dConfig::new().with_channels(vec![8, 16, 32]).with_strides(vec![2]);
        assert!(matches!(
            validate_network(&mismatched),
            Err(SegmentationError::InvalidConfiguration(_))
        ));
        let single = UNet3dConfig::new().with_channels(vec![8]).with_strides(vec![]);
        assert!(validate_network(&single).is_err());
        let zero_stride = UNet3dConfig::new().with_strides(vec![2, 0, 2]);
        assert!(validate_network(&zero_stride).is_err());
        let zero_classes = UNet3dConfig::new().with_out_channels(0);
        assert!(validate_network(&zero_classes).is_err());
    }

    #[test]
    fn test_validate_counts() {
        assert!(validate_epochs(0).is_err());
        assert!(validate_batch_size(0).is_err());
        assert!(validate_batch_size(16).is_ok());
    }
}
