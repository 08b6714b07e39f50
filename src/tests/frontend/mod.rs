mod t_printer;
mod t_reader;
