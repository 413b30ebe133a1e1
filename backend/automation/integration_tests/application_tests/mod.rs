mod helpers;
mod lifecycle;
mod projects;
mod shutdown;
