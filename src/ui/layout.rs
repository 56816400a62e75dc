//! Root document shell wrapped around every page.

use crate::config::Theme;

/// CSS variables the stylesheet keys typography on.
pub const FONT_VARIABLES: [(&str, &str); 3] = [
    ("--font-host-grotesk", "Host Grotesk"),
    ("--font-inter", "Inter"),
    ("--font-geist-mono", "Geist Mono"),
];

const FONT_STYLESHEET: &str = "https://fonts.googleapis.com/css2?family=Host+Grotesk:wght@300..800&family=Inter:wght@100..900&family=Geist+Mono:wght@100..900&display=swap";

#[derive(Debug, Clone)]
pub struct PageMeta {
    pub title: String,
    pub description: String,
}

#[derive(Debug, Clone)]
pub struct Layout {
    pub meta: PageMeta,
    pub theme: Theme,
}

impl Layout {
    pub fn new(meta: PageMeta, theme: Theme) -> Self {
        Self { meta, theme }
    }

    /// Wrap `children` (already escaped markup) in the document shell: the
    /// theme class on `<html>`, font variables, the toaster mount and the
    /// tooltip provider root.
    pub fn render(&self, children: &str) -> String {
        let font_vars: String = FONT_VARIABLES
            .iter()
            .map(|(var, family)| format!("{var}:'{family}',sans-serif;"))
            .collect();
        // "system" resolves client-side from prefers-color-scheme
        let theme_script = match self.theme {
            Theme::System => concat!(
                "<script>document.documentElement.className=",
                "matchMedia('(prefers-color-scheme: dark)').matches?'dark':'light'",
                "</script>"
            ),
            _ => "",
        };
        format!(
            r#"<!DOCTYPE html>
<html lang="en" class="{theme}" data-default-theme="{theme}">
<head>
<meta charset="utf-8">
<meta name="viewport" content="width=device-width, initial-scale=1">
<title>{title}</title>
<meta name="description" content="{description}">
<link rel="preconnect" href="https://fonts.gstatic.com" crossorigin>
<link rel="stylesheet" href="{fonts}">
<link rel="stylesheet" href="/globals.css">
<style>:root{{{font_vars}}}</style>
{theme_script}
</head>
<body class="antialiased">
<section data-toaster aria-live="polite" aria-label="Notifications"></section>
<div data-tooltip-provider>
{children}
</div>
</body>
</html>
"#,
            theme = self.theme.as_str(),
            title = escape(&self.meta.title),
            description = escape(&self.meta.description),
            fonts = escape(FONT_STYLESHEET),
        )
    }
}

/// Minimal HTML text/attribute escaping.
pub fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layout(theme: Theme) -> Layout {
        Layout::new(
            PageMeta {
                title: "AIWA <Template>".into(),
                description: "CRMs & more".into(),
            },
            theme,
        )
    }

    #[test]
    fn dark_theme_is_applied_to_the_root() {
        let html = layout(Theme::Dark).render("<main>hi</main>");
        assert!(html.contains(r#"<html lang="en" class="dark""#));
        assert!(html.contains("<title>AIWA &lt;Template&gt;</title>"));
        assert!(html.contains(r#"content="CRMs &amp; more""#));
        assert!(html.contains("--font-inter:'Inter',sans-serif;"));
        assert!(html.contains("<section data-toaster"));
        assert!(html.contains("<div data-tooltip-provider>\n<main>hi</main>\n</div>"));
        assert!(!html.contains("prefers-color-scheme"));
    }

    #[test]
    fn system_theme_resolves_client_side() {
        let html = layout(Theme::System).render("");
        assert!(html.contains("prefers-color-scheme"));
    }
}
