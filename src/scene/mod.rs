//! Scene inputs: meshes, materials, vis areas and geometry providers

pub mod material;
pub mod mesh;
pub mod source;
pub mod vis_area;

pub use material::Material;
pub use mesh::{LooseTriangle, MeshMobility, MeshSnapshot};
pub use source::{EmptyScene, GeometrySource, StaticScene};
pub use vis_area::VisArea;
