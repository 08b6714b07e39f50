mod t_maximal_paths;
