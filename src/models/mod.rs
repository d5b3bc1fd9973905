pub mod cluster_installation;
pub mod size;
