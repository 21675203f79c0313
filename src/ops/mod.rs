pub mod batchlets;
pub mod shared;
pub mod sources;
pub mod storages;
