//! The Qdrant vs S3 Vectors comparison catalogue
//!
//! - `dataset`: fifty movies and a handful of filming locations
//! - `fixture`: seeds every ready backend with the embedded movies
//! - `catalogue`: the canonical scenarios, registered in id order

pub mod catalogue;
pub mod dataset;
pub mod fixture;

pub use catalogue::catalogue;
pub use dataset::{movie, movies, Location, Movie, LOCATIONS, MOVIES, PARIS};
pub use fixture::{movie_items, MovieFixture};
