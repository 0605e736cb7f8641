//! Static sector → image-type prompt table for slide imagery.
//!
//! Lookup is two-level with documented defaults: an unrecognized sector
//! resolves to `manufacturing`, an unrecognized image type to `abstract`.
//! The sector key is the first whitespace-delimited word, lowercased, so
//! "Technology Services" and "technology" hit the same row.

pub const DEFAULT_SECTOR: &str = "manufacturing";
pub const DEFAULT_IMAGE_TYPE: &str = "abstract";

/// Image types a batch walks through, in order.
pub const IMAGE_TYPES: &[&str] = &["product", "facility", "abstract"];

#[derive(Clone, Copy, Debug)]
pub struct SectorPrompts {
    pub sector: &'static str,
    pub product: &'static [&'static str],
    pub facility: &'static [&'static str],
    pub abstract_: &'static [&'static str],
}

impl SectorPrompts {
    pub fn for_type(&self, image_type: &str) -> &'static [&'static str] {
        match image_type {
            "product" => self.product,
            "facility" => self.facility,
            _ => self.abstract_,
        }
    }
}

pub const SECTOR_PROMPTS: &[SectorPrompts] = &[
    SectorPrompts {
        sector: "manufacturing",
        product: &[
            "Professional photograph of precision engineered metal components on white background, industrial quality, no logos",
            "Modern manufacturing equipment in clean factory setting, professional lighting, no visible branding",
            "High-quality machined parts arrangement, industrial photography style, neutral background",
        ],
        facility: &[
            "Modern manufacturing plant interior with automated machinery, bright lighting, professional photograph",
            "Clean industrial workspace with robotic arms, modern factory aesthetic, no logos visible",
            "Aerial view of modern industrial complex, professional photography, generic design",
        ],
        abstract_: &[
            "Abstract representation of manufacturing precision, geometric shapes in blue and silver, professional design",
            "Modern industrial infographic background, clean lines, professional color scheme",
        ],
    },
    SectorPrompts {
        sector: "pharmaceuticals",
        product: &[
            "Pharmaceutical laboratory with modern equipment, clean room aesthetic, professional photograph",
            "Medicine capsules and tablets arrangement on white background, pharmaceutical quality",
            "Scientific research equipment in modern lab setting, no branding visible",
        ],
        facility: &[
            "Modern pharmaceutical research facility interior, clean and bright, professional",
            "GMP certified production line, clean room environment, generic design",
        ],
        abstract_: &[
            "Abstract molecular structure visualization, pharmaceutical blue tones, professional design",
            "DNA helix with pharmaceutical elements, modern scientific aesthetic",
        ],
    },
    SectorPrompts {
        sector: "technology",
        product: &[
            "Modern server room with blue LED lighting, technology aesthetic, professional",
            "Software development workspace, multiple monitors with code, modern office",
            "Cloud computing visualization, abstract data center concept",
        ],
        facility: &[
            "Modern tech office space with collaborative areas, bright and innovative design",
            "Data center interior with server racks, blue lighting, professional photograph",
        ],
        abstract_: &[
            "Abstract network connectivity visualization, blue nodes and connections",
            "Digital transformation concept, modern technology infographic style",
        ],
    },
    SectorPrompts {
        sector: "logistics",
        product: &[
            "Modern logistics warehouse interior, organized shelving, professional lighting",
            "Fleet of delivery trucks, aerial view, professional photograph, no logos",
            "Automated sorting facility, conveyor systems, modern logistics",
        ],
        facility: &[
            "Large distribution center aerial view, modern logistics hub design",
            "Supply chain visualization, warehouse to delivery network",
        ],
        abstract_: &[
            "Abstract supply chain network, connected nodes and routes, professional design",
            "Global logistics map visualization, modern infographic style",
        ],
    },
    SectorPrompts {
        sector: "electronics",
        product: &[
            "Printed circuit boards arrangement, electronic components, professional macro photography",
            "Modern electronic assembly, semiconductor chips, clean room environment",
            "Aerospace electronics modules, high-precision components, professional",
        ],
        facility: &[
            "Electronics manufacturing clean room, automated assembly lines",
            "R&D laboratory with testing equipment, modern electronics facility",
        ],
        abstract_: &[
            "Abstract circuit pattern, electronic pathways, blue and gold tones",
            "Technology innovation concept, electronic components in modern design",
        ],
    },
    SectorPrompts {
        sector: "entertainment",
        product: &[
            "Modern cinema interior, comfortable seating, ambient lighting",
            "Movie theater projection room, professional equipment",
            "Entertainment venue lobby, modern design aesthetic",
        ],
        facility: &[
            "Multiplex cinema exterior, modern architecture, evening lighting",
            "Entertainment complex aerial view, contemporary design",
        ],
        abstract_: &[
            "Abstract entertainment concept, film reel and digital elements",
            "Movie and media visualization, creative industry design",
        ],
    },
];

/// First word of the sector, lowercased. "Technology Services" -> "technology".
pub fn sector_key(sector: &str) -> String {
    sector
        .split_whitespace()
        .next()
        .unwrap_or(DEFAULT_SECTOR)
        .to_ascii_lowercase()
}

pub fn prompts_for(sector: &str, image_type: &str) -> &'static [&'static str] {
    let key = sector_key(sector);
    let row = SECTOR_PROMPTS
        .iter()
        .find(|row| row.sector == key)
        .or_else(|| SECTOR_PROMPTS.iter().find(|row| row.sector == DEFAULT_SECTOR));
    match row {
        Some(row) => row.for_type(image_type),
        None => &[],
    }
}
