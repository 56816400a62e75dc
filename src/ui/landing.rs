use super::layout::escape;

#[derive(Debug, Clone)]
pub struct Landing {
    pub logo_src: String,
    pub logo_alt: String,
    pub heading: String,
    pub tagline: String,
    pub quote: String,
    pub attribution: String,
    pub footnote: String,
}

impl Default for Landing {
    fn default() -> Self {
        Self {
            logo_src: "/falcon.webp".to_string(),
            logo_alt: "Falcon".to_string(),
            heading: "Falcon CRM Template".to_string(),
            tagline: "A production-ready template for building beautiful, accessible CRMs"
                .to_string(),
            quote: "Corporations that are purely AI and ROBOTICS will outperform corporations that have people in the loop.".to_string(),
            attribution: "~ Elon, 2026".to_string(),
            footnote: "Built with Rust, axum and sqlx".to_string(),
        }
    }
}

impl Landing {
    pub fn render(&self) -> String {
        format!(
            r#"<main class="min-h-screen flex flex-col items-center justify-center p-8">
<div class="max-w-4xl mx-auto text-center space-y-12">
<div class="flex justify-center"><img src="{logo_src}" alt="{logo_alt}" width="200" height="200" fetchpriority="high" class="logo"></div>
<div class="space-y-4">
<h1>{heading}</h1>
<p class="text-muted-foreground">{tagline}</p>
</div>
<figure class="relative max-w-3xl mx-auto">
<blockquote>{quote}</blockquote>
<figcaption class="text-muted-foreground">{attribution}</figcaption>
</figure>
<div class="pt-8"><p class="text-sm text-muted-foreground">{footnote}</p></div>
</div>
</main>"#,
            logo_src = escape(&self.logo_src),
            logo_alt = escape(&self.logo_alt),
            heading = escape(&self.heading),
            tagline = escape(&self.tagline),
            quote = escape(&self.quote),
            attribution = escape(&self.attribution),
            footnote = escape(&self.footnote),
        )
    }
}
