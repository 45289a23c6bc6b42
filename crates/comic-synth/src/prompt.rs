//! Prompt construction for panel synthesis.

use comic_models::StyleCatalog;

/// Placeholder substituted with the style's prompt text.
pub const STYLE_PLACEHOLDER: &str = "$STYLE";

/// Used when a style has no prompt text of its own.
pub const FALLBACK_STYLE_TEXT: &str = "a comic book style";

/// Base instructions for turning a video frame into a single panel.
pub const DEFAULT_PROMPT: &str = "Reimagine this frame as ONE comic-book panel.
Style: $STYLE

Redraw the whole scene as NEW comic art (not a filter, not a paint-over).
Keep the same characters + action + camera angle.
Make it legible at 300x300: clear silhouettes, clean shapes, strong contrast.
Clean line art, coherent perspective; no abstract blobs; no unfinished areas.
Square 512x512 composition; center the main subject.
No border around the edge. No text, captions, bubbles, watermarks, or UI overlays.
Ignore and remove any on-screen debug/timestamp/resolution text from the source.
";

/// Render a template for the given style text.
pub fn render_prompt(template: &str, style_text: Option<&str>) -> String {
    let text = style_text
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or(FALLBACK_STYLE_TEXT);
    template.replacen(STYLE_PLACEHOLDER, text, 1)
}

/// Build the default prompt for a catalog style.
pub fn build_prompt(catalog: &StyleCatalog, style: &str) -> String {
    render_prompt(DEFAULT_PROMPT, catalog.prompt(style))
}
