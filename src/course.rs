//! Video discovery in a course's content tree

use regex::Regex;
use std::collections::HashSet;
use std::sync::OnceLock;

use crate::captions::PROVIDER_DOMAIN;
use crate::store::{ContentItem, Course, CourseSection};

fn provider_url_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"(?:https?://)?(?:www\.|player\.)?vimeo\.com/(?:video/)?\d+[^\s"'<>]*"#)
            .expect("provider URL pattern is valid")
    })
}

/// Whether a URL points at the captioning provider
pub fn is_provider_url(url: &str) -> bool {
    url.contains(PROVIDER_DOMAIN)
}

/// Distinct video URLs anywhere in the course, in content order
pub fn course_video_urls(course: &Course) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut urls = Vec::new();
    for section in &course.sections {
        collect_urls(&section.content, &mut seen, &mut urls);
    }
    urls
}

/// Distinct video URLs of one section, including nested subsections
pub fn section_video_urls(section: &CourseSection) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut urls = Vec::new();
    collect_urls(&section.content, &mut seen, &mut urls);
    urls
}

fn collect_urls(items: &[ContentItem], seen: &mut HashSet<String>, urls: &mut Vec<String>) {
    for item in items {
        match item {
            ContentItem::Video { url, .. } => {
                let url = url.trim();
                if !url.is_empty() && seen.insert(url.to_string()) {
                    urls.push(url.to_string());
                }
            }
            ContentItem::Lesson {
                media_content: Some(media),
                ..
            } => {
                for found in provider_url_regex().find_iter(media) {
                    let url = found.as_str().to_string();
                    if seen.insert(url.clone()) {
                        urls.push(url);
                    }
                }
            }
            ContentItem::Section { content, .. } => collect_urls(content, seen, urls),
            ContentItem::Lesson { .. } | ContentItem::Other => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_course() -> Course {
        Course {
            id: "C1".to_string(),
            title: "Rust".to_string(),
            description: String::new(),
            sections: vec![
                CourseSection {
                    title: "Basics".to_string(),
                    content: vec![
                        ContentItem::Video {
                            url: "https://vimeo.com/1".to_string(),
                            title: None,
                        },
                        ContentItem::Other,
                        ContentItem::Section {
                            title: "Nested".to_string(),
                            content: vec![ContentItem::Lesson {
                                title: "Ownership".to_string(),
                                media_content: Some(
                                    r#"<iframe src="https://player.vimeo.com/video/2"></iframe>"#
                                        .to_string(),
                                ),
                            }],
                        },
                    ],
                },
                CourseSection {
                    title: "Again".to_string(),
                    content: vec![
                        ContentItem::Video {
                            url: "https://vimeo.com/1".to_string(),
                            title: None,
                        },
                        ContentItem::Lesson {
                            title: "Reading".to_string(),
                            media_content: Some("No video here".to_string()),
                        },
                    ],
                },
            ],
        }
    }

    #[test]
    fn test_course_urls_are_distinct_and_ordered() {
        assert_eq!(
            course_video_urls(&sample_course()),
            vec![
                "https://vimeo.com/1".to_string(),
                "https://player.vimeo.com/video/2".to_string()
            ]
        );
    }

    #[test]
    fn test_section_urls_include_subsections() {
        let course = sample_course();
        assert_eq!(section_video_urls(&course.sections[0]).len(), 2);
        assert_eq!(
            section_video_urls(&course.sections[1]),
            vec!["https://vimeo.com/1".to_string()]
        );
    }

    #[test]
    fn test_provider_url_detection() {
        assert!(is_provider_url("https://vimeo.com/1"));
        assert!(!is_provider_url("https://youtube.com/watch?v=1"));
    }
}
