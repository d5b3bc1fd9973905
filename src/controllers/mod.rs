pub mod installation;
