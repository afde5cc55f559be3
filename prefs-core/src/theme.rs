//! Lightweight theme activation seam.

/// Activates the lightweight theme selected by an incoming record.
///
/// The selected-theme preference is never assigned directly; the theme
/// manager owns it and updates it as a side effect of activation.
pub trait ThemeManager: Send + Sync {
    /// Activate the previously used theme `theme_id`, or clear the current
    /// theme when `None`.
    fn activate_theme(&self, theme_id: Option<&str>);
}
