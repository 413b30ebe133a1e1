mod launch;
mod port_file;
mod process;
