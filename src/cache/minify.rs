//! HTML minification applied before a page is stored.

use std::cell::Cell;
use std::rc::Rc;

use bytes::Bytes;
use lol_html::html_content::{ContentType, EndTag, TextType};
use lol_html::{EndTagHandler, RewriteStrSettings, doc_comments, doc_text, element, rewrite_str};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MinifyError {
    #[error("rendered body is not valid utf-8")]
    NotUtf8(#[from] std::str::Utf8Error),
    #[error("html rewrite failed: {0}")]
    Rewrite(String),
}

/// Transform applied to a rendered page before capture.
pub trait HtmlMinifier: Send + Sync {
    fn minify(&self, html: &[u8]) -> Result<Bytes, MinifyError>;
}

/// Streaming minifier built on `lol_html`.
///
/// Drops comments (conditional comments are kept) and collapses whitespace runs in
/// ordinary text to a single space. Text inside `pre`, `textarea`, `title`, `script`
/// and `style` is left untouched.
#[derive(Debug, Clone, Copy, Default)]
pub struct LolHtmlMinifier;

impl HtmlMinifier for LolHtmlMinifier {
    fn minify(&self, html: &[u8]) -> Result<Bytes, MinifyError> {
        let html = std::str::from_utf8(html)?;
        let pre_depth = Rc::new(Cell::new(0usize));

        let minified = rewrite_str(
            html,
            RewriteStrSettings {
                element_content_handlers: vec![element!("pre", {
                    let pre_depth = Rc::clone(&pre_depth);
                    move |el| {
                        pre_depth.set(pre_depth.get() + 1);
                        if let Some(handlers) = el.end_tag_handlers() {
                            let pre_depth = Rc::clone(&pre_depth);
                            let handler: EndTagHandler<'static> =
                                Box::new(move |_end: &mut EndTag<'_>| {
                                    pre_depth.set(pre_depth.get().saturating_sub(1));
                                    Ok(())
                                });
                            handlers.push(handler);
                        } else {
                            pre_depth.set(pre_depth.get().saturating_sub(1));
                        }
                        Ok(())
                    }
                })],
                document_content_handlers: vec![
                    doc_comments!(|comment| {
                        if !is_conditional_comment(&comment.text()) {
                            comment.remove();
                        }
                        Ok(())
                    }),
                    doc_text!({
                        let pre_depth = Rc::clone(&pre_depth);
                        move |chunk| {
                            if pre_depth.get() > 0 || !matches!(chunk.text_type(), TextType::Data)
                            {
                                return Ok(());
                            }
                            let collapsed = collapse_whitespace(chunk.as_str());
                            if collapsed != chunk.as_str() {
                                chunk.replace(&collapsed, ContentType::Html);
                            }
                            Ok(())
                        }
                    }),
                ],
                ..RewriteStrSettings::default()
            },
        )
        .map_err(|err| MinifyError::Rewrite(err.to_string()))?;

        Ok(Bytes::from(minified))
    }
}

fn is_conditional_comment(text: &str) -> bool {
    let text = text.trim_start();
    text.starts_with("[if") || text.starts_with("<![endif]")
}

fn collapse_whitespace(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_run = false;
    for ch in text.chars() {
        if ch.is_ascii_whitespace() {
            if !in_run {
                out.push(' ');
                in_run = true;
            }
        } else {
            out.push(ch);
            in_run = false;
        }
    }
    out
}
