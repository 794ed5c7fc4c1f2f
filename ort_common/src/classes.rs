//! Class tables of exported YOLO models.

use anyhow::{Context, bail};

/// COCO-80 labels, used when a model carries no `names` metadata.
pub const COCO_NAMES: [&str; 80] = [
    "person",
    "bicycle",
    "car",
    "motorcycle",
    "airplane",
    "bus",
    "train",
    "truck",
    "boat",
    "traffic light",
    "fire hydrant",
    "stop sign",
    "parking meter",
    "bench",
    "bird",
    "cat",
    "dog",
    "horse",
    "sheep",
    "cow",
    "elephant",
    "bear",
    "zebra",
    "giraffe",
    "backpack",
    "umbrella",
    "handbag",
    "tie",
    "suitcase",
    "frisbee",
    "skis",
    "snowboard",
    "sports ball",
    "kite",
    "baseball bat",
    "baseball glove",
    "skateboard",
    "surfboard",
    "tennis racket",
    "bottle",
    "wine glass",
    "cup",
    "fork",
    "knife",
    "spoon",
    "bowl",
    "banana",
    "apple",
    "sandwich",
    "orange",
    "broccoli",
    "carrot",
    "hot dog",
    "pizza",
    "donut",
    "cake",
    "chair",
    "couch",
    "potted plant",
    "bed",
    "dining table",
    "toilet",
    "tv",
    "laptop",
    "mouse",
    "remote",
    "keyboard",
    "cell phone",
    "microwave",
    "oven",
    "toaster",
    "sink",
    "refrigerator",
    "book",
    "clock",
    "vase",
    "scissors",
    "teddy bear",
    "hair drier",
    "toothbrush",
];

pub fn coco_names() -> Vec<String> {
    COCO_NAMES.iter().map(|name| name.to_string()).collect()
}

/// Parses the `names` metadata written by the ultralytics exporter, e.g.
/// `{0: 'person', 1: 'bicycle'}`, into labels ordered by class index.
pub fn parse_class_names(raw: &str) -> anyhow::Result<Vec<String>> {
    let inner = raw
        .trim()
        .strip_prefix('{')
        .and_then(|s| s.strip_suffix('}'))
        .with_context(|| format!("class names are not a mapping: {raw:?}"))?;

    let mut entries: Vec<(usize, String)> = Vec::new();
    let mut rest = inner.trim_start();
    while !rest.is_empty() {
        let (key, after_key) = rest
            .split_once(':')
            .with_context(|| format!("missing ':' in class names near {rest:?}"))?;
        let index: usize = key
            .trim()
            .parse()
            .with_context(|| format!("invalid class index {key:?}"))?;

        let after_key = after_key.trim_start();
        let quote = after_key
            .chars()
            .next()
            .filter(|c| *c == '\'' || *c == '"')
            .with_context(|| format!("class {index} has no quoted name"))?;
        let body = &after_key[1..];
        let end = body
            .find(quote)
            .with_context(|| format!("unterminated name for class {index}"))?;
        entries.push((index, body[..end].to_string()));

        rest = body[end + 1..].trim_start();
        rest = rest.strip_prefix(',').unwrap_or(rest).trim_start();
    }

    entries.sort_by_key(|(index, _)| *index);
    for (expected, (index, _)) in entries.iter().enumerate() {
        if *index != expected {
            bail!("class indices are not contiguous: expected {expected}, found {index}");
        }
    }
    Ok(entries.into_iter().map(|(_, name)| name).collect())
}

/// Index of `target` in `names`, ignoring ASCII case.
pub fn find_class(names: &[String], target: &str) -> Option<usize> {
    names.iter().position(|name| name.eq_ignore_ascii_case(target))
}
